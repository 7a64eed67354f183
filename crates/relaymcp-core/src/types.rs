//! Domain types exchanged by clients and servers.
//!
//! Wire field names follow MCP casing (`mimeType`, `uriTemplate`,
//! `inputSchema`); optional fields are omitted when absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A URI-addressed readable artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI
    pub uri: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resource {
    /// Create a resource with only a URI
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            mime_type: None,
            description: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A parameterized family of resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// RFC 6570 style URI template
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type of the produced resources
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResourceTemplate {
    /// Create a template with only its URI template
    pub fn new(uri_template: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: None,
            mime_type: None,
            description: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One declared tool parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParam {
    /// Parameter name
    pub name: String,
    /// JSON schema type name (`string`, `number`, ...)
    pub param_type: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Whether callers must supply it
    pub required: bool,
}

impl ToolParam {
    /// Create a parameter
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: None,
            required,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named, schema-described procedure
///
/// On the wire the parameter list becomes an `inputSchema` object, present
/// only when the tool declares parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ToolWire", into = "ToolWire")]
pub struct Tool {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Ordered parameter list
    pub params: Vec<ToolParam>,
}

impl Tool {
    /// Create a tool without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a parameter
    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// JSON schema object describing the parameters, if any
    pub fn input_schema(&self) -> Option<Value> {
        if self.params.is_empty() {
            return None;
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut property = Map::new();
            property.insert("type".into(), Value::String(param.param_type.clone()));
            if let Some(description) = &param.description {
                property.insert("description".into(), Value::String(description.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(property));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), Value::String("object".into()));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Some(Value::Object(schema))
    }
}

#[derive(Serialize, Deserialize)]
struct ToolWire {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    input_schema: Option<Value>,
}

impl From<Tool> for ToolWire {
    fn from(tool: Tool) -> Self {
        let input_schema = tool.input_schema();
        Self {
            name: tool.name,
            description: tool.description,
            input_schema,
        }
    }
}

impl From<ToolWire> for Tool {
    fn from(wire: ToolWire) -> Self {
        let params = wire
            .input_schema
            .as_ref()
            .map(params_from_schema)
            .unwrap_or_default();
        Self {
            name: wire.name,
            description: wire.description,
            params,
        }
    }
}

fn params_from_schema(schema: &Value) -> Vec<ToolParam> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, property)| ToolParam {
                    name: name.clone(),
                    param_type: property
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("string")
                        .to_string(),
                    description: property
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    required: required.contains(&name.as_str()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Content item tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// UTF-8 text
    Text,
    /// JSON document
    Json,
    /// Opaque bytes
    Binary,
}

impl ContentKind {
    /// Wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }
}

/// One element of a resource-read or tool-call result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Item tag
    pub kind: ContentKind,
    /// MIME type
    pub mime_type: Option<String>,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl ContentItem {
    /// Text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            mime_type: None,
            data: text.into().into_bytes(),
        }
    }

    /// JSON item holding a serialized document
    pub fn json(value: &Value) -> Self {
        Self {
            kind: ContentKind::Json,
            mime_type: Some("application/json".into()),
            data: value.to_string().into_bytes(),
        }
    }

    /// Binary item
    pub fn binary(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Binary,
            mime_type: Some(mime_type.into()),
            data,
        }
    }

    /// Set the MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as text (lossy for non UTF-8 bytes)
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Entry of a `read_resource` `contents` array
    ///
    /// Only text items carry their payload as `text`.
    pub fn to_resource_json(&self, uri: &str) -> Value {
        let mut item = Map::new();
        item.insert("uri".into(), Value::String(uri.to_string()));
        if let Some(mime_type) = &self.mime_type {
            item.insert("mimeType".into(), Value::String(mime_type.clone()));
        }
        if self.kind == ContentKind::Text {
            item.insert("text".into(), Value::String(self.as_text().into_owned()));
        }
        Value::Object(item)
    }

    /// Entry of a `call_tool` `content` array
    pub fn to_tool_json(&self) -> Value {
        let mut item = Map::new();
        item.insert("type".into(), Value::String(self.kind.as_str().into()));
        if let Some(mime_type) = &self.mime_type {
            item.insert("mimeType".into(), Value::String(mime_type.clone()));
        }
        item.insert("text".into(), Value::String(self.as_text().into_owned()));
        Value::Object(item)
    }

    /// Rebuild an item from either wire shape
    ///
    /// Resource entries have no `type` and are read as text when `text` is
    /// present, binary otherwise.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = object.get("text").and_then(Value::as_str);
        let kind = match object.get("type").and_then(Value::as_str) {
            Some("text") => ContentKind::Text,
            Some("json") => ContentKind::Json,
            Some("binary") => ContentKind::Binary,
            Some(_) => return None,
            None if text.is_some() => ContentKind::Text,
            None => ContentKind::Binary,
        };
        Some(Self {
            kind,
            mime_type: object
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string),
            data: text.map(|t| t.as_bytes().to_vec()).unwrap_or_default(),
        })
    }
}

/// Result of a tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// Produced content
    pub content: Vec<ContentItem>,
    /// Whether the tool reported a failure
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output
    pub fn success(content: Vec<ContentItem>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Tool-level failure output
    pub fn failure(content: Vec<ContentItem>) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// `call_tool` result object
    pub fn to_json(&self) -> Value {
        let mut result = Map::new();
        result.insert(
            "content".into(),
            Value::Array(self.content.iter().map(ContentItem::to_tool_json).collect()),
        );
        result.insert("isError".into(), Value::Bool(self.is_error));
        Value::Object(result)
    }

    /// Read a `call_tool` result object; unrecognized items are skipped
    pub fn from_json(value: &Value) -> Option<Self> {
        let content = value
            .get("content")?
            .as_array()?
            .iter()
            .filter_map(ContentItem::from_json)
            .collect();
        Some(Self {
            content,
            is_error: value.get("isError").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}
