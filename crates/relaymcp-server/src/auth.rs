//! Authentication and wildcard access control
//!
//! A server with a configured API key authenticates in API-key mode; every
//! other server accepts any caller as `anonymous`. Keys are hashed with
//! BLAKE3 and compared with `subtle::ConstantTimeEq`, so comparison time
//! does not depend on where the keys differ or on their lengths.

use std::time::{SystemTime, UNIX_EPOCH};

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::config::AccessConfig;

/// Identifier given to callers of servers without an API key
pub const ANONYMOUS: &str = "anonymous";

/// Identifier given to callers that presented the right API key
pub const AUTHENTICATED_CLIENT: &str = "authenticated_client";

/// Authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// No credentials required
    None,
    /// Shared API key in `params.apiKey`
    ApiKey,
}

/// Result of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// How the caller authenticated
    pub kind: AuthKind,
    /// Caller identity
    pub identifier: String,
    /// Unix time after which the context is invalid; 0 never expires
    pub expiry_epoch: u64,
    /// Resource URI patterns
    pub allowed_resources: Vec<String>,
    /// Tool name patterns
    pub allowed_tools: Vec<String>,
}

impl AuthContext {
    /// Non-expiring anonymous context allowed everything
    pub fn anonymous() -> Self {
        Self {
            kind: AuthKind::None,
            identifier: ANONYMOUS.to_string(),
            expiry_epoch: 0,
            allowed_resources: vec!["*".to_string()],
            allowed_tools: vec!["*".to_string()],
        }
    }

    /// Whether the context has passed its expiry time
    pub fn is_expired(&self) -> bool {
        self.expiry_epoch != 0 && now_epoch() > self.expiry_epoch
    }

    /// Whether the caller may read `uri`
    pub fn check_resource_access(&self, uri: &str) -> bool {
        self.check(&self.allowed_resources, "resource", uri)
    }

    /// Whether the caller may invoke tool `name`
    pub fn check_tool_access(&self, name: &str) -> bool {
        self.check(&self.allowed_tools, "tool", name)
    }

    fn check(&self, patterns: &[String], what: &str, target: &str) -> bool {
        if self.is_expired() {
            warn!("Auth context for '{}' expired.", self.identifier);
            return false;
        }
        match patterns.iter().find(|p| wildcard_match(p, target)) {
            Some(pattern) => {
                debug!(
                    "Access granted for '{}' to {} '{}' (match: {})",
                    self.identifier, what, target, pattern
                );
                true
            }
            None => {
                info!(
                    "Access denied for '{}' to {} '{}'. No matching rule found.",
                    self.identifier, what, target
                );
                false
            }
        }
    }
}

/// Credential verification for one server
#[derive(Debug, Clone)]
pub struct Authenticator {
    key_hash: Option<[u8; 32]>,
    access: AccessConfig,
}

impl Authenticator {
    /// Build from the server's key and granted patterns
    pub fn new(api_key: Option<&str>, access: AccessConfig) -> Self {
        Self {
            key_hash: api_key.map(hash_key),
            access,
        }
    }

    /// Mode callers authenticate in
    pub fn kind(&self) -> AuthKind {
        if self.key_hash.is_some() {
            AuthKind::ApiKey
        } else {
            AuthKind::None
        }
    }

    /// Verify the credentials presented with a message
    ///
    /// Returns `None` when authentication fails.
    pub fn verify(&self, credentials: Option<&str>) -> Option<AuthContext> {
        let (kind, identifier) = match &self.key_hash {
            None => (AuthKind::None, ANONYMOUS),
            Some(expected) => {
                let provided = hash_key(credentials?);
                if !bool::from(provided.ct_eq(expected)) {
                    warn!("Authentication failed: API key not recognized");
                    return None;
                }
                (AuthKind::ApiKey, AUTHENTICATED_CLIENT)
            }
        };
        debug!("Authenticated as '{}'", identifier);
        Some(AuthContext {
            kind,
            identifier: identifier.to_string(),
            expiry_epoch: 0,
            allowed_resources: self.access.resources.clone(),
            allowed_tools: self.access.tools.clone(),
        })
    }
}

fn hash_key(key: &str) -> [u8; 32] {
    blake3::hash(key.as_bytes()).into()
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Shell-style match where `*` stands for any run of characters
///
/// Every other character matches itself.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}
