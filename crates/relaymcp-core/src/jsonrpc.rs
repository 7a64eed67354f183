//! JSON-RPC 2.0 codec.
//!
//! Request ids are unsigned 64-bit integers; zero means "no id". Every
//! formatter emits keys in the order `jsonrpc`, `id`, `method`/`result`/`error`,
//! `params`, which peers rely on for byte-exact comparisons.
//!
//! ```rust
//! use relaymcp_core::jsonrpc;
//!
//! let text = jsonrpc::format_request(1, "ping", None);
//! assert_eq!(text, r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#);
//!
//! let response = jsonrpc::parse_response(r#"{"jsonrpc":"2.0","id":1,"result":{"message":"pong"}}"#)?;
//! assert_eq!(response.id, 1);
//! assert_eq!(response.outcome.as_deref(), Ok(r#"{"message":"pong"}"#));
//! # Ok::<(), relaymcp_core::McpError>(())
//! ```

use serde_json::value::RawValue;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::{ErrorCode, McpError, McpResult};

/// JSON-RPC version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Id used when a message carries none
pub const NO_ID: u64 = 0;

/// A method call expecting a response
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request id
    pub id: u64,
    /// Method name
    pub method: String,
    /// Parameters, if supplied
    pub params: Option<Value>,
}

/// A method call without an id
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name
    pub method: String,
    /// Parameters, if supplied
    pub params: Option<Value>,
}

/// A parsed response
///
/// `outcome` holds the stringified `result` (JSON `null` when the handler
/// produced no value) or the error object.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered
    pub id: u64,
    /// Result text or error
    pub outcome: Result<String, McpError>,
}

/// Tagged union of the three message shapes
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Method call expecting a response
    Request(Request),
    /// Method call without response
    Notification(Notification),
    /// Response to an earlier request
    Response(Response),
}

impl Message {
    /// Id of requests and responses
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Request(request) => Some(request.id),
            Self::Response(response) => Some(response.id),
            Self::Notification(_) => None,
        }
    }

    /// Method name of requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(&request.method),
            Self::Notification(notification) => Some(&notification.method),
            Self::Response(_) => None,
        }
    }
}

/// Result of parsing one inbound payload
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Parsed messages in input order, malformed batch entries skipped
    pub messages: Vec<Message>,
    /// Whether the payload was a top-level array
    pub is_batch: bool,
}

/// Format a request; absent params become `{}`
pub fn format_request(id: u64, method: &str, params: Option<&Value>) -> String {
    let params = params.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Format a request whose params are already-serialized JSON text
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidParams`] if `params_json` is not valid JSON.
pub fn format_request_raw(id: u64, method: &str, params_json: &str) -> McpResult<String> {
    let params: &RawValue = serde_json::from_str(params_json)
        .map_err(|e| McpError::invalid_params(format!("Invalid params JSON: {e}")))?;
    Ok(format!(
        r#"{{"jsonrpc":"{}","id":{},"method":{},"params":{}}}"#,
        JSONRPC_VERSION,
        id,
        Value::String(method.to_string()),
        params.get()
    ))
}

/// Format a notification; absent params are omitted
pub fn format_notification(method: &str, params: Option<&Value>) -> String {
    let mut object = Map::new();
    object.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
    object.insert("method".into(), Value::String(method.into()));
    if let Some(params) = params {
        object.insert("params".into(), params.clone());
    }
    Value::Object(object).to_string()
}

/// Format a success response
pub fn format_success_response(id: u64, result: &Value) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
    .to_string()
}

/// Format a success response embedding pre-serialized result JSON verbatim
pub fn format_raw_success_response(id: u64, result: &RawValue) -> String {
    format!(
        r#"{{"jsonrpc":"{}","id":{},"result":{}}}"#,
        JSONRPC_VERSION,
        id,
        result.get()
    )
}

/// Format an error response
pub fn format_error_response(id: u64, code: ErrorCode, message: &str) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code.as_i32(),
            "message": message,
        },
    })
    .to_string()
}

/// Format an error response from an [`McpError`]
pub fn format_error(id: u64, error: &McpError) -> String {
    format_error_response(id, error.code, &error.message)
}

/// Join responses into a batch array; `None` when there is nothing to send
pub fn format_batch(responses: &[String]) -> Option<String> {
    if responses.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(responses.iter().map(|r| r.len() + 1).sum::<usize>() + 1);
    out.push('[');
    for (i, response) in responses.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(response);
    }
    out.push(']');
    Some(out)
}

/// Read a request id from a JSON value
///
/// Accepts only non-negative integers representable as u64.
///
/// # Errors
///
/// Returns [`ErrorCode::ParseError`] for strings, fractions, negative or
/// out-of-range numbers.
pub fn parse_id(value: &Value) -> McpResult<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| McpError::parse(format!("Invalid request id: {number}"))),
        other => Err(McpError::parse(format!("Request id must be a number, got {other}"))),
    }
}

/// Parse a response message
///
/// When both `result` and a well-formed `error` are present the error wins
/// and a warning is logged.
///
/// # Errors
///
/// Returns [`ErrorCode::ParseError`] when the text is not a JSON object,
/// the id is invalid, or neither a usable `result` nor `error` is present.
pub fn parse_response(text: &str) -> McpResult<Response> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| McpError::parse(format!("Invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| McpError::parse("Response is not a JSON object"))?;
    response_from_object(object)
}

fn response_from_object(object: &Map<String, Value>) -> McpResult<Response> {
    let id = match object.get("id") {
        Some(Value::Null) | None => NO_ID,
        Some(id) => parse_id(id)?,
    };

    let result = object.get("result");
    match object.get("error") {
        Some(error) => {
            let error = parse_error_object(error)?;
            if result.is_some() {
                warn!(
                    "Response {} carries both result and error; using the error",
                    id
                );
            }
            Ok(Response {
                id,
                outcome: Err(error),
            })
        }
        None => {
            let result = result.ok_or_else(|| McpError::parse("Response has neither result nor error"))?;
            Ok(Response {
                id,
                outcome: Ok(result.to_string()),
            })
        }
    }
}

fn parse_error_object(error: &Value) -> McpResult<McpError> {
    let code = error
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| McpError::parse("Error object has no integer code"))?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::parse("Error object has no message"))?;
    Ok(McpError::new(ErrorCode::from_i32(code), message))
}

/// Parse a single request
///
/// # Errors
///
/// Returns an error if the text is not a request with a valid id.
pub fn parse_request(text: &str) -> McpResult<Request> {
    match parse_message(text)? {
        Message::Request(request) => Ok(request),
        _ => Err(McpError::invalid_request("Message is not a request")),
    }
}

/// Parse a single (non-batch) message
///
/// # Errors
///
/// [`ErrorCode::ParseError`] for malformed JSON, [`ErrorCode::InvalidRequest`]
/// for valid JSON that is not a JSON-RPC message.
pub fn parse_message(text: &str) -> McpResult<Message> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| McpError::parse(format!("Invalid JSON: {e}")))?;
    message_from_value(&value)
}

/// Parse a payload that is either one message or a batch array
///
/// Malformed batch elements are logged and skipped.
///
/// # Errors
///
/// [`ErrorCode::ParseError`] for malformed JSON or an empty array,
/// [`ErrorCode::InvalidRequest`] for a single invalid message.
pub fn parse_payload(text: &str) -> McpResult<Payload> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| McpError::parse(format!("Invalid JSON: {e}")))?;

    match value {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Err(McpError::parse("Empty batch"));
            }
            let total = elements.len();
            let messages: Vec<Message> = elements
                .iter()
                .enumerate()
                .filter_map(|(index, element)| match message_from_value(element) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        debug!("Skipping malformed batch element {}: {}", index, e.message);
                        None
                    }
                })
                .collect();
            debug!("Parsed batch: {} of {} elements valid", messages.len(), total);
            Ok(Payload {
                messages,
                is_batch: true,
            })
        }
        single => Ok(Payload {
            messages: vec![message_from_value(&single)?],
            is_batch: false,
        }),
    }
}

fn message_from_value(value: &Value) -> McpResult<Message> {
    let object = value
        .as_object()
        .ok_or_else(|| McpError::invalid_request("Message is not a JSON object"))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(McpError::invalid_request(format!(
                "Invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{other}'"
            )));
        }
        None => return Err(McpError::invalid_request("Missing jsonrpc version")),
    }

    if let Some(method) = object.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| McpError::invalid_request("Method must be a string"))?
            .to_string();
        let params = object.get("params").cloned();

        return match object.get("id") {
            None | Some(Value::Null) => Ok(Message::Notification(Notification { method, params })),
            Some(id) => {
                let id = parse_id(id)
                    .map_err(|e| McpError::invalid_request(e.message))?;
                Ok(Message::Request(Request { id, method, params }))
            }
        };
    }

    if object.contains_key("result") || object.contains_key("error") {
        return response_from_object(object).map(Message::Response);
    }

    Err(McpError::invalid_request("Message is neither request nor response"))
}

/// Find the id of a message without fully parsing it
///
/// Scans for the first `"id"` key and reads the numeric literal after the
/// colon. Strings, fractions, missing ids and overflow yield [`NO_ID`].
pub fn extract_id(bytes: &[u8]) -> u64 {
    const KEY: &[u8] = b"\"id\"";

    let Some(start) = bytes.windows(KEY.len()).position(|w| w == KEY) else {
        return NO_ID;
    };
    let mut rest = skip_whitespace(&bytes[start + KEY.len()..]);
    match rest.split_first() {
        Some((b':', tail)) => rest = skip_whitespace(tail),
        _ => return NO_ID,
    }

    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return NO_ID;
    }
    if matches!(rest.get(digits), Some(b'.' | b'e' | b'E')) {
        return NO_ID;
    }

    rest[..digits].iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
    .unwrap_or(NO_ID)
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &bytes[skip..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_format_request_defaults_params() {
        let text = format_request(1, "ping", None);
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#);
    }

    #[test]
    fn test_format_request_raw_embeds_params_verbatim() {
        let text = format_request_raw(7, "call_tool", r#"{"name":"echo","arguments":{"x":1}}"#).unwrap();
        assert_eq!(
            text,
            r#"{"jsonrpc":"2.0","id":7,"method":"call_tool","params":{"name":"echo","arguments":{"x":1}}}"#
        );
        assert!(format_request_raw(7, "x", "{nope").is_err());
    }

    #[test]
    fn test_format_responses() {
        assert_eq!(
            format_success_response(1, &json!({"message": "pong"})),
            r#"{"jsonrpc":"2.0","id":1,"result":{"message":"pong"}}"#
        );
        assert_eq!(
            format_success_response(2, &Value::Null),
            r#"{"jsonrpc":"2.0","id":2,"result":null}"#
        );
        assert_eq!(
            format_error_response(3, ErrorCode::MethodNotFound, "Method not found"),
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#
        );
    }

    #[test]
    fn test_format_notification_omits_id() {
        assert_eq!(format_notification("notify", None), r#"{"jsonrpc":"2.0","method":"notify"}"#);
    }

    #[test]
    fn test_format_batch() {
        assert_eq!(format_batch(&[]), None);
        let batch = format_batch(&["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]).unwrap();
        assert_eq!(batch, r#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn test_parse_response_result_is_stringified() {
        let response = parse_response(r#"{"jsonrpc":"2.0","id":1,"result":{"message":"pong"}}"#).unwrap();
        assert_eq!(response.id, 1);
        assert_eq!(response.outcome, Ok(r#"{"message":"pong"}"#.to_string()));
    }

    #[test]
    fn test_parse_response_null_result() {
        let response = parse_response(r#"{"jsonrpc":"2.0","id":4,"result":null}"#).unwrap();
        assert_eq!(response.outcome, Ok("null".to_string()));
    }

    #[test]
    fn test_parse_response_rejects_bad_ids() {
        assert!(parse_response(r#"{"id":-1,"result":1}"#).is_err());
        assert!(parse_response(r#"{"id":1.5,"result":1}"#).is_err());
        assert!(parse_response(r#"{"id":"1","result":1}"#).is_err());
        assert!(parse_response(r#"{"id":18446744073709551616,"result":1}"#).is_err());
        assert!(parse_response("[1]").is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn test_parse_response_max_id() {
        let text = format_success_response(u64::MAX, &json!(true));
        assert_eq!(parse_response(&text).unwrap().id, u64::MAX);
    }

    #[test]
    fn test_error_wins_over_result() {
        let response =
            parse_response(r#"{"id":1,"result":1,"error":{"code":-32603,"message":"boom"}}"#).unwrap();
        assert_eq!(response.outcome, Err(McpError::internal("boom")));
    }

    #[test]
    fn test_unparseable_error_with_result_is_rejected() {
        assert!(parse_response(r#"{"id":1,"result":1,"error":{"code":"x"}}"#).is_err());
        assert!(parse_response(r#"{"id":1}"#).is_err());
    }

    #[test]
    fn test_parse_payload_batch_skips_malformed() {
        let payload = parse_payload(
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping","params":{}},
                {"jsonrpc":"2.0","method":"notify"},
                42,
                {"jsonrpc":"2.0","id":2,"method":"unknown","params":{}}]"#,
        )
        .unwrap();
        assert!(payload.is_batch);
        assert_eq!(payload.messages.len(), 3);
        assert_eq!(payload.messages[0].id(), Some(1));
        assert!(matches!(payload.messages[1], Message::Notification(_)));
        assert_eq!(payload.messages[2].method(), Some("unknown"));
    }

    #[test]
    fn test_parse_payload_rejects_empty_batch() {
        let err = parse_payload("[]").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_parse_payload_single_invalid() {
        let err = parse_payload(r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        let err = parse_payload("{").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id(br#"{"jsonrpc":"2.0","id":42,"method":"x"}"#), 42);
        assert_eq!(extract_id(br#"{"id" : 7}"#), 7);
        assert_eq!(extract_id(br#"{"id":"7"}"#), 0);
        assert_eq!(extract_id(br#"{"method":"x"}"#), 0);
        assert_eq!(extract_id(br#"{"id":1.5}"#), 0);
        assert_eq!(extract_id(br#"{"id":99999999999999999999999}"#), 0);
        assert_eq!(extract_id(br#"{"id":-3}"#), 0);
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(id in any::<u64>(), method in "[a-z_/]{1,24}", params in json_value()) {
            let text = format_request_raw(id, &method, &params.to_string()).unwrap();
            let request = parse_request(&text).unwrap();
            prop_assert_eq!(request.id, id);
            prop_assert_eq!(request.method, method);
            prop_assert_eq!(request.params, Some(params));
        }

        #[test]
        fn prop_error_response_round_trip(id in any::<u64>(), message in ".{0,64}") {
            let text = format_error_response(id, ErrorCode::InvalidParams, &message);
            let response = parse_response(&text).unwrap();
            prop_assert_eq!(response.id, id);
            prop_assert_eq!(response.outcome, Err(McpError::invalid_params(message)));
        }
    }
}
