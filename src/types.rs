use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Placeholder standing in for any binary payload, request or response side.
pub const BINARY_PLACEHOLDER: &str = "[Binary Data]";
/// Placeholder for multipart form bodies.
pub const FORM_PLACEHOLDER: &str = "[FormData]";
pub const UNSERIALIZABLE_BODY: &str = "[Unable to serialize body]";
pub const UNREADABLE_RESPONSE: &str = "[Unable to read response]";
pub const NO_CLOSE_REASON: &str = "No reason";

/// Which call surface produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "request", alias = "Fetch/XHR")]
    Request,
    #[serde(rename = "socket", alias = "Socket")]
    Socket,
}

/// Lifecycle state of a persistent socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

impl SocketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SocketState::Closed | SocketState::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

/// One frame seen on an observed socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketMessage {
    pub id: String,
    pub direction: Direction,
    pub data: String,
    /// Unix milliseconds
    pub timestamp: u64,
}

/// Request and response header maps. Keys are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    #[serde(default)]
    pub request: BTreeMap<String, String>,
    #[serde(default)]
    pub response: BTreeMap<String, String>,
}

impl Headers {
    pub fn set_request(&mut self, name: &str, value: impl Into<String>) {
        self.request.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn set_response(&mut self, name: &str, value: impl Into<String>) {
        self.response.insert(name.to_ascii_lowercase(), value.into());
    }
}

/// One observed outbound call or persistent-connection lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub method: String,
    pub url: String,
    /// 0 until resolved
    #[serde(default)]
    pub status: u16,
    #[serde(rename = "response_time", default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub request_body: String,
    #[serde(default, alias = "response")]
    pub response_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<BTreeMap<String, Value>>,
    #[serde(rename = "ws_state", default, skip_serializing_if = "Option::is_none")]
    pub socket_state: Option<SocketState>,
    #[serde(rename = "ws_messages", default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<SocketMessage>>,
    /// Human-readable outcome of a socket (error text or close reason)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl RequestRecord {
    /// Creation record emitted the moment a socket is constructed.
    pub fn socket_connecting(id: String, url: String) -> Self {
        let mut headers = Headers::default();
        headers.set_request("upgrade", "websocket");
        Self {
            id,
            kind: RecordKind::Socket,
            method: "WebSocket".to_string(),
            url,
            status: 0,
            elapsed_ms: 0,
            headers,
            request_body: String::new(),
            response_body: String::new(),
            cookies: None,
            query_params: None,
            socket_state: Some(SocketState::Connecting),
            messages: Some(Vec::new()),
            summary: None,
        }
    }
}

/// Partial update for an existing socket record. Every field is optional;
/// absent fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SocketState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "response_time", default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SocketMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
}

impl SocketUpdate {
    pub fn opened(elapsed_ms: u64) -> Self {
        Self {
            state: Some(SocketState::Open),
            status: Some(101),
            elapsed_ms: Some(elapsed_ms),
            ..Default::default()
        }
    }

    pub fn message(message: SocketMessage) -> Self {
        Self {
            message: Some(message),
            ..Default::default()
        }
    }

    pub fn closing() -> Self {
        Self {
            state: Some(SocketState::Closing),
            ..Default::default()
        }
    }

    pub fn closed(code: u16, reason: &str, elapsed_ms: u64) -> Self {
        let reason = if reason.is_empty() { NO_CLOSE_REASON } else { reason };
        Self {
            state: Some(SocketState::Closed),
            status: Some(code),
            elapsed_ms: Some(elapsed_ms),
            close_reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(SocketState::Error),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "log")]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Loosely-typed logging argument.
///
/// Values are kept as the caller passed them. Anything JSON cannot carry
/// (non-finite floats, opaque values) is substituted only when the argument
/// is serialized.
#[derive(Debug, Clone)]
pub enum LogArg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(Value),
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl LogArg {
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => LogArg::Json(value),
            Err(e) => LogArg::Str(format!("[Unserializable value: {}]", e)),
        }
    }

    pub fn opaque<T: fmt::Debug + Send + Sync + 'static>(value: T) -> Self {
        LogArg::Opaque(Arc::new(value))
    }

    /// Plain-text rendering used when joining args into one line.
    pub fn render(&self) -> String {
        match self {
            LogArg::Null => "null".to_string(),
            LogArg::Bool(b) => b.to_string(),
            LogArg::Int(i) => i.to_string(),
            LogArg::Float(f) => f.to_string(),
            LogArg::Str(s) => s.clone(),
            LogArg::Json(Value::String(s)) => s.clone(),
            LogArg::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            LogArg::Opaque(v) => format!("{:?}", v),
        }
    }
}

impl PartialEq for LogArg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LogArg::Null, LogArg::Null) => true,
            (LogArg::Bool(a), LogArg::Bool(b)) => a == b,
            (LogArg::Int(a), LogArg::Int(b)) => a == b,
            (LogArg::Float(a), LogArg::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (LogArg::Str(a), LogArg::Str(b)) => a == b,
            (LogArg::Json(a), LogArg::Json(b)) => a == b,
            (LogArg::Opaque(a), LogArg::Opaque(b)) => format!("{:?}", a) == format!("{:?}", b),
            _ => false,
        }
    }
}

impl Serialize for LogArg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LogArg::Null => serializer.serialize_unit(),
            LogArg::Bool(b) => serializer.serialize_bool(*b),
            LogArg::Int(i) => serializer.serialize_i64(*i),
            LogArg::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            LogArg::Float(f) => serializer.serialize_str(&f.to_string()),
            LogArg::Str(s) => serializer.serialize_str(s),
            LogArg::Json(v) => v.serialize(serializer),
            LogArg::Opaque(v) => serializer.collect_str(&format_args!("{:?}", v)),
        }
    }
}

impl<'de> Deserialize<'de> for LogArg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(LogArg::from)
    }
}

impl From<Value> for LogArg {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => LogArg::Null,
            Value::Bool(b) => LogArg::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => LogArg::Int(i),
                None => n.as_f64().map(LogArg::Float).unwrap_or(LogArg::Json(Value::Number(n))),
            },
            Value::String(s) => LogArg::Str(s),
            other => LogArg::Json(other),
        }
    }
}

impl From<&str> for LogArg {
    fn from(value: &str) -> Self {
        LogArg::Str(value.to_string())
    }
}

impl From<String> for LogArg {
    fn from(value: String) -> Self {
        LogArg::Str(value)
    }
}

impl From<bool> for LogArg {
    fn from(value: bool) -> Self {
        LogArg::Bool(value)
    }
}

impl From<i64> for LogArg {
    fn from(value: i64) -> Self {
        LogArg::Int(value)
    }
}

impl From<i32> for LogArg {
    fn from(value: i32) -> Self {
        LogArg::Int(value.into())
    }
}

impl From<f64> for LogArg {
    fn from(value: f64) -> Self {
        LogArg::Float(value)
    }
}

/// One structured logging call. Append-only, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLogRecord {
    pub level: LogLevel,
    #[serde(default)]
    pub args: Vec<LogArg>,
}

impl ConsoleLogRecord {
    pub fn new(level: LogLevel, args: Vec<LogArg>) -> Self {
        Self { level, args }
    }

    /// Args joined into a single display line
    pub fn message(&self) -> String {
        self.args
            .iter()
            .map(LogArg::render)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_decodes_legacy_field_names() {
        let raw = json!({
            "id": "abc",
            "type": "Fetch/XHR",
            "method": "GET",
            "url": "https://api.example.com/users/1",
            "status": 200,
            "response_time": 87,
            "headers": { "request": {}, "response": { "content-type": "application/json" } },
            "response": "{}"
        });
        let record: RequestRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.kind, RecordKind::Request);
        assert_eq!(record.elapsed_ms, 87);
        assert_eq!(record.response_body, "{}");
        assert!(record.cookies.is_none());
    }

    #[test]
    fn test_socket_record_serializes_ws_fields() {
        let record = RequestRecord::socket_connecting("s1".into(), "ws://example.com/feed".into());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "socket");
        assert_eq!(value["ws_state"], "connecting");
        assert_eq!(value["ws_messages"], json!([]));
        assert_eq!(value["headers"]["request"]["upgrade"], "websocket");
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = Headers::default();
        headers.set_request("Content-Type", "text/plain");
        headers.set_request("content-type", "application/json");
        assert_eq!(headers.request.len(), 1);
        assert_eq!(headers.request["content-type"], "application/json");
    }

    #[test]
    fn test_non_finite_float_is_substituted_at_encode() {
        let arg = LogArg::Float(f64::NAN);
        assert!(matches!(arg, LogArg::Float(_)));
        assert_eq!(serde_json::to_value(&arg).unwrap(), json!("NaN"));
        assert_eq!(serde_json::to_value(LogArg::Float(1.5)).unwrap(), json!(1.5));
    }

    #[test]
    fn test_opaque_arg_encodes_as_debug() {
        #[derive(Debug)]
        struct Handle {
            fd: i32,
        }
        let arg = LogArg::opaque(Handle { fd: 7 });
        assert_eq!(serde_json::to_value(&arg).unwrap(), json!("Handle { fd: 7 }"));
    }

    #[test]
    fn test_console_message_joins_args() {
        let record = ConsoleLogRecord::new(
            LogLevel::Warn,
            vec!["retrying".into(), 3.into(), LogArg::Json(json!({"a": 1}))],
        );
        assert_eq!(record.message(), "retrying 3 {\n  \"a\": 1\n}");
    }

    #[test]
    fn test_log_level_accepts_log_alias() {
        let level: LogLevel = serde_json::from_value(json!("log")).unwrap();
        assert_eq!(level, LogLevel::Info);
    }

    #[test]
    fn test_closed_update_defaults_reason() {
        let update = SocketUpdate::closed(1000, "", 40);
        assert_eq!(update.close_reason.as_deref(), Some(NO_CLOSE_REASON));
        assert_eq!(update.state, Some(SocketState::Closed));
    }
}
