//! Server configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use relaymcp_transport::DEFAULT_MAX_MESSAGE_SIZE;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "RELAYMCP";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Server description
    pub description: Option<String>,
    /// Shared API key; when set every message must carry it as `params.apiKey`
    pub api_key: Option<String>,
    /// Enabled method groups
    pub capabilities: CapabilitiesConfig,
    /// Wildcard patterns granted to authenticated callers
    pub access: AccessConfig,
    /// Worker threads for asynchronous dispatch
    pub thread_pool_size: usize,
    /// Bounded queue in front of the workers
    pub task_queue_size: usize,
    /// Maximum cached resources
    pub cache_capacity: usize,
    /// Default cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
    /// Largest accepted inbound message in bytes
    pub max_message_size: usize,
    /// Per-client rate limiting
    pub rate_limit: RateLimitConfig,
    /// Request forwarding to backend servers
    pub gateway: GatewayConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Which method groups the server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// `list_resources`, `list_resource_templates`, `read_resource`
    pub resources: bool,
    /// `list_tools`, `call_tool`
    pub tools: bool,
}

/// Resource and tool patterns granted by a successful authentication
///
/// `*` matches any substring; the default grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Patterns matched against `read_resource` URIs
    pub resources: Vec<String>,
    /// Patterns matched against `call_tool` names
    pub tools: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            resources: vec!["*".to_string()],
            tools: vec!["*".to_string()],
        }
    }
}

/// Fixed-window rate limiting; zero window or zero max disables it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Requests allowed per client per window
    pub max_requests: u64,
    /// Expected number of distinct clients (sizes the counter table)
    pub capacity: usize,
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Forward matching requests instead of handling them locally
    pub enabled: bool,
    /// Idle connections kept per backend
    pub pool_size: usize,
    /// Known backends, checked in order
    pub backends: Vec<BackendConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool_size: 4,
            backends: Vec::new(),
        }
    }
}

/// One backend server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Display name used in logs
    pub name: String,
    /// `host:port` of the backend's framed TCP endpoint
    pub address: String,
    /// Connect and request timeout in milliseconds
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Which requests go to this backend
    #[serde(default)]
    pub routing: RoutingRules,
}

/// Routing rules for a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    /// `read_resource` URIs starting with any of these
    pub resource_prefixes: Vec<String>,
    /// `read_resource` URIs matching any of these regular expressions
    pub resource_regex: Vec<String>,
    /// `call_tool` names matched exactly
    pub tool_names: Vec<String>,
}

fn default_backend_timeout_ms() -> u64 {
    5_000
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (`RUST_LOG` takes precedence)
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub structured: bool,
    /// Where log lines go
    pub output: LogOutput,
    /// Directory for file output
    pub directory: Option<PathBuf>,
    /// File name prefix for file output
    pub file_prefix: String,
    /// File rotation policy
    pub rotation: LogRotation,
}

/// Log destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error only
    #[default]
    Stderr,
    /// Files under [`LoggingConfig::directory`] only
    FileOnly,
    /// Standard error and files
    Both,
    /// Logging disabled
    None,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// New file every minute
    Minute,
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
    /// Single file
    #[default]
    Never,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: crate::SERVER_NAME.to_string(),
            version: crate::SERVER_VERSION.to_string(),
            description: None,
            api_key: None,
            capabilities: CapabilitiesConfig::default(),
            access: AccessConfig::default(),
            thread_pool_size: 4,
            task_queue_size: 1024,
            cache_capacity: 4096,
            cache_ttl_secs: 300,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rate_limit: RateLimitConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            resources: true,
            tools: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
            capacity: 1024,
        }
    }
}

impl RateLimitConfig {
    /// Limiting turned off
    pub fn disabled() -> Self {
        Self {
            window_secs: 0,
            max_requests: 0,
            ..Self::default()
        }
    }

    /// Whether requests are counted at all
    pub fn is_enabled(&self) -> bool {
        self.window_secs > 0 && self.max_requests > 0
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: "relaymcp".to_string(),
            rotation: LogRotation::Never,
        }
    }
}

impl LoggingConfig {
    /// Errors only, to stderr
    pub fn stderr_minimal() -> Self {
        Self {
            level: "error".to_string(),
            ..Self::default()
        }
    }

    /// Debug output to stderr
    pub fn stderr_debug() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Files only, keeping stdout and stderr clean
    pub fn file_only(directory: impl Into<PathBuf>) -> Self {
        Self {
            output: LogOutput::FileOnly,
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    /// JSON lines to hourly files and stderr
    pub fn production(directory: impl Into<PathBuf>) -> Self {
        Self {
            structured: true,
            output: LogOutput::Both,
            directory: Some(directory.into()),
            rotation: LogRotation::Hourly,
            ..Self::default()
        }
    }
}

/// A specialized `Result` type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Values parsed but are unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ServerConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format follows the file extension. Environment variables with the
    /// `RELAYMCP_` prefix override file settings, with `__` separating
    /// nested keys (`RELAYMCP_RATE_LIMIT__MAX_REQUESTS=50`).
    ///
    /// ```rust,no_run
    /// use relaymcp_server::ServerConfig;
    ///
    /// let config = ServerConfig::from_file("relaymcp.toml")?;
    /// # Ok::<(), relaymcp_server::ConfigError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_file`].
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> ConfigResult<Self> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    ///
    /// ```rust
    /// use relaymcp_server::ServerConfig;
    ///
    /// let config = ServerConfig::builder()
    ///     .name("edge")
    ///     .api_key("secret")
    ///     .build();
    /// assert_eq!(config.name, "edge");
    /// ```
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Reject settings the server cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.thread_pool_size == 0 {
            return Err(ConfigError::Invalid("thread_pool_size must be at least 1".into()));
        }
        if self.task_queue_size == 0 {
            return Err(ConfigError::Invalid("task_queue_size must be at least 1".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be at least 1".into()));
        }
        let limit = &self.rate_limit;
        if (limit.window_secs == 0) != (limit.max_requests == 0) {
            return Err(ConfigError::Invalid(
                "rate_limit.window_secs and rate_limit.max_requests must both be zero or both be set"
                    .into(),
            ));
        }
        if self.gateway.enabled {
            for backend in &self.gateway.backends {
                if backend.address.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "backend '{}' has no address",
                        backend.name
                    )));
                }
                for pattern in &backend.routing.resource_regex {
                    regex::Regex::new(pattern).map_err(|e| {
                        ConfigError::Invalid(format!("backend '{}': {e}", backend.name))
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Configuration builder
#[derive(Debug)]
pub struct ConfigurationBuilder {
    config: ServerConfig,
}

impl ConfigurationBuilder {
    /// Create a new configuration builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set server name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set server version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set server description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Require an API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Enable or disable method groups
    #[must_use]
    pub fn capabilities(mut self, resources: bool, tools: bool) -> Self {
        self.config.capabilities = CapabilitiesConfig { resources, tools };
        self
    }

    /// Restrict the resource and tool patterns callers are granted
    pub fn access(mut self, resources: Vec<String>, tools: Vec<String>) -> Self {
        self.config.access = AccessConfig { resources, tools };
        self
    }

    /// Size the worker pool and its queue
    #[must_use]
    pub fn thread_pool(mut self, size: usize, queue: usize) -> Self {
        self.config.thread_pool_size = size;
        self.config.task_queue_size = queue;
        self
    }

    /// Size the resource cache
    #[must_use]
    pub fn cache(mut self, capacity: usize, ttl_secs: u64) -> Self {
        self.config.cache_capacity = capacity;
        self.config.cache_ttl_secs = ttl_secs;
        self
    }

    /// Set the maximum inbound message size
    #[must_use]
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.config.max_message_size = max;
        self
    }

    /// Configure rate limiting (zero disables)
    #[must_use]
    pub fn rate_limit(mut self, window_secs: u64, max_requests: u64) -> Self {
        self.config.rate_limit.window_secs = window_secs;
        self.config.rate_limit.max_requests = max_requests;
        self
    }

    /// Enable the gateway with these backends
    pub fn gateway(mut self, backends: Vec<BackendConfig>) -> Self {
        self.config.gateway.enabled = true;
        self.config.gateway.backends = backends;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(extension: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.name, crate::SERVER_NAME);
        assert_eq!(config.thread_pool_size, 4);
        assert_eq!(config.task_queue_size, 1024);
        assert_eq!(config.cache_capacity, 4096);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert!(!config.gateway.enabled);
        assert_eq!(config.gateway.pool_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_toml() {
        let file = write_config(
            "toml",
            r#"
name = "edge"
api_key = "k"
thread_pool_size = 2

[rate_limit]
window_secs = 10
max_requests = 5

[[gateway.backends]]
name = "files"
address = "127.0.0.1:9001"
routing = { resource_prefixes = ["file://"] }
"#,
        );

        let config = ServerConfig::from_file_with_prefix(file.path(), "RELAYMCP_TEST_TOML").unwrap();
        assert_eq!(config.name, "edge");
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.thread_pool_size, 2);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.gateway.backends[0].timeout_ms, 5_000);
        assert_eq!(config.gateway.backends[0].routing.resource_prefixes, vec!["file://"]);
        assert_eq!(config.cache_capacity, 4096);
    }

    #[test]
    #[serial]
    fn test_load_json() {
        let file = write_config("json", r#"{"name": "json-server", "capabilities": {"tools": false}}"#);
        let config = ServerConfig::from_file_with_prefix(file.path(), "RELAYMCP_TEST_JSON").unwrap();
        assert_eq!(config.name, "json-server");
        assert!(config.capabilities.resources);
        assert!(!config.capabilities.tools);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let file = write_config("yaml", "name: from-file\nthread_pool_size: 2\n");
        // SAFETY: serialized with the other environment tests
        unsafe {
            std::env::set_var("RELAYMCP_TEST_ENV_THREAD_POOL_SIZE", "8");
        }
        let config = ServerConfig::from_file_with_prefix(file.path(), "RELAYMCP_TEST_ENV");
        unsafe {
            std::env::remove_var("RELAYMCP_TEST_ENV_THREAD_POOL_SIZE");
        }
        let config = config.unwrap();
        assert_eq!(config.name, "from-file");
        assert_eq!(config.thread_pool_size, 8);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/nonexistent/relaymcp.toml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config("ini", "name = x");
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ConfigError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServerConfig::builder().thread_pool(0, 16).build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ServerConfig::builder().rate_limit(0, 10).build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ServerConfig::builder()
            .gateway(vec![BackendConfig {
                name: "bad".into(),
                address: "127.0.0.1:1".into(),
                timeout_ms: 100,
                routing: RoutingRules {
                    resource_regex: vec!["(".into()],
                    ..RoutingRules::default()
                },
            }])
            .build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rate_limit_disabled() {
        assert!(!RateLimitConfig::disabled().is_enabled());
        assert!(RateLimitConfig::default().is_enabled());
        assert!(ServerConfig::builder().rate_limit(0, 0).build().validate().is_ok());
    }

    #[test]
    fn test_logging_presets() {
        assert_eq!(LoggingConfig::stderr_minimal().level, "error");
        assert_eq!(LoggingConfig::stderr_debug().level, "debug");
        let production = LoggingConfig::production("/var/log/relaymcp");
        assert_eq!(production.output, LogOutput::Both);
        assert_eq!(production.rotation, LogRotation::Hourly);
        assert!(production.structured);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_config_name_preservation(name in "[a-zA-Z0-9_-]{1,50}") {
                let config = ConfigurationBuilder::new().name(&name).build();
                prop_assert_eq!(config.name, name);
            }

            #[test]
            fn test_nonzero_pools_validate(size in 1usize..64, queue in 1usize..4096) {
                let config = ConfigurationBuilder::new().thread_pool(size, queue).build();
                prop_assert!(config.validate().is_ok());
            }
        }
    }
}
