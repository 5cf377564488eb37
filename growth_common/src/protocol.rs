//! Command/reply wire protocol.
//!
//! Every endpoint (dispatch server, DAQ program, display server) speaks the
//! same request/reply messages:
//!
//! - request: `{"command": "<target>.<verb>", "option": {...}}`
//! - reply: a JSON object carrying at least `status` (`"ok"` or `"error"`)
//!
//! On the dispatch server's port messages travel as frames: a 4-byte
//! big-endian length prefix followed by the UTF-8 JSON body. The DAQ program
//! and display server carry the same JSON bodies as ZeroMQ messages.

use crate::consts::{CONTROLLER_TARGET, MAX_FRAME_LEN};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::warn;

/// Error types for protocol and transport operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Send or receive did not complete within the configured timeout.
    #[error("timed out waiting for peer")]
    Timeout,

    /// Peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Frame length prefix exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding failed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Request carried an empty command string.
    #[error("empty command")]
    EmptyCommand,

    /// Could not connect to the endpoint.
    #[error("could not connect to {0}")]
    NotConnected(String),

    /// Peer answered with `status: "error"`.
    #[error("error reply: {0}")]
    ErrorReply(String),
}

impl ProtocolError {
    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(e),
        }
    }
}

// ─── Options ────────────────────────────────────────────────────────

/// Error raised when a command option is missing or malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    /// Option key not present.
    #[error("missing option '{0}'")]
    Missing(String),

    /// Option present but not convertible to the requested type.
    #[error("invalid option '{key}' ({value})")]
    Invalid { key: String, value: String },
}

/// Command options (`option` object of a request).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// True if no options are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric option. Numeric strings are accepted; `NaN` and infinities
    /// are not.
    pub fn number(&self, key: &str) -> Result<f64, OptionError> {
        let value = self
            .get(key)
            .ok_or_else(|| OptionError::Missing(key.to_string()))?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(key, value))
    }

    /// Integer option; fractional parts are truncated.
    pub fn integer(&self, key: &str) -> Result<i64, OptionError> {
        let number = self.number(key)?.trunc();
        if number >= i64::MIN as f64 && number < i64::MAX as f64 {
            Ok(number as i64)
        } else {
            Err(invalid(key, &Value::from(number)))
        }
    }

    /// String option.
    pub fn string(&self, key: &str) -> Result<&str, OptionError> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(OptionError::Invalid {
                key: key.to_string(),
                value: other.to_string(),
            }),
            None => Err(OptionError::Missing(key.to_string())),
        }
    }

    /// Underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn invalid(key: &str, value: &Value) -> OptionError {
    OptionError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ─── Commands ───────────────────────────────────────────────────────

/// Request as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// `"<target>.<verb>"` or a bare `"<verb>"` addressing the controller.
    pub command: String,
    /// Command options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<Options>,
}

impl CommandRequest {
    /// Request for a bare command string (used toward the DAQ and display
    /// endpoints, which have no target prefix).
    pub fn bare(command: &str) -> Self {
        Self {
            command: command.to_string(),
            option: None,
        }
    }

    /// Attach options.
    pub fn with_options(mut self, options: Options) -> Self {
        self.option = Some(options);
        self
    }
}

/// Addressee of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The dispatch server itself.
    Controller,
    /// A named subsystem module.
    Module(String),
}

impl Target {
    /// Name as it appears in replies (`subsystem` field).
    pub fn name(&self) -> &str {
        match self {
            Target::Controller => CONTROLLER_TARGET,
            Target::Module(name) => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: Target,
    pub verb: String,
    pub options: Options,
}

impl Command {
    /// Command addressed to a module by name.
    pub fn new(target: &str, verb: &str, options: Options) -> Self {
        let target = if target == CONTROLLER_TARGET {
            Target::Controller
        } else {
            Target::Module(target.to_string())
        };
        Self {
            target,
            verb: verb.to_string(),
            options,
        }
    }

    /// Parse a wire request.
    ///
    /// A command containing `.` splits into `target.verb` at the first dot;
    /// otherwise the target is the controller.
    pub fn parse(request: CommandRequest) -> Result<Self, ProtocolError> {
        let command = request.command.trim();
        if command.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        let options = request.option.unwrap_or_default();
        Ok(match command.split_once('.') {
            Some((target, verb)) => Self::new(target, verb, options),
            None => Self {
                target: Target::Controller,
                verb: command.to_string(),
                options,
            },
        })
    }

    /// Wire form of this command.
    pub fn to_request(&self) -> CommandRequest {
        CommandRequest {
            command: format!("{}.{}", self.target.name(), self.verb),
            option: Some(self.options.clone()),
        }
    }
}

// ─── Replies ────────────────────────────────────────────────────────

/// `status` field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    /// Any status other than `ok` is treated as an error.
    #[default]
    #[serde(other)]
    Error,
}

/// Structured reply produced by a module handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Command succeeded; `fields` carries command-specific data.
    Ok {
        message: Option<String>,
        fields: Map<String, Value>,
    },
    /// Command failed.
    Error { message: String },
}

impl Reply {
    /// Successful reply without payload.
    pub fn ok() -> Self {
        Reply::Ok {
            message: None,
            fields: Map::new(),
        }
    }

    /// Error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            message: message.into(),
        }
    }

    /// Attach a human-readable message. Replaces the message of an error.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Reply::Ok { message, .. } => *message = Some(text.into()),
            Reply::Error { message } => *message = text.into(),
        }
        self
    }

    /// Attach a payload field. Ignored on error replies. A value that cannot
    /// be serialized is logged and sent as `null`.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Reply::Ok { fields, .. } = &mut self {
            let value = serde_json::to_value(value).unwrap_or_else(|e| {
                warn!("Reply field '{}' could not be serialized: {}", key, e);
                Value::Null
            });
            fields.insert(key.to_string(), value);
        }
        self
    }

    /// Collapse a handler result into a reply.
    pub fn from_result<E: fmt::Display>(result: Result<Reply, E>) -> Self {
        result.unwrap_or_else(|e| Reply::error(e.to_string()))
    }

    /// True for `status: "ok"`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok { .. })
    }

    /// Message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Reply::Ok { message, .. } => message.as_deref(),
            Reply::Error { message } => Some(message),
        }
    }

    /// Payload field lookup (always `None` for errors).
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Reply::Ok { fields, .. } => fields.get(key),
            Reply::Error { .. } => None,
        }
    }

    /// Decode the payload of a successful reply into a typed snapshot.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        match self {
            Reply::Ok { fields, .. } => Ok(serde_json::from_value(Value::Object(fields.clone()))?),
            Reply::Error { message } => Err(ProtocolError::ErrorReply(message.clone())),
        }
    }

    /// Wire form, stamped with the answering subsystem.
    pub fn into_frame(self, subsystem: &str) -> ReplyFrame {
        let (status, message, fields) = match self {
            Reply::Ok { message, fields } => (ReplyStatus::Ok, message, fields),
            Reply::Error { message } => (ReplyStatus::Error, Some(message), Map::new()),
        };
        ReplyFrame {
            status,
            message,
            subsystem: Some(subsystem.to_string()),
            fields,
        }
    }
}

/// Reply as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    #[serde(default)]
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Answering subsystem; absent on replies from the DAQ/display programs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<ReplyFrame> for Reply {
    fn from(frame: ReplyFrame) -> Self {
        match frame.status {
            ReplyStatus::Ok => Reply::Ok {
                message: frame.message,
                fields: frame.fields,
            },
            ReplyStatus::Error => Reply::Error {
                message: frame.message.unwrap_or_default(),
            },
        }
    }
}

// ─── Framing ────────────────────────────────────────────────────────

/// Write a length-prefixed JSON message to a stream.
///
/// Format: 4-byte big-endian length prefix + JSON data
pub fn write_frame<T: Serialize, W: Write>(stream: &mut W, message: &T) -> Result<(), ProtocolError> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(json.len()));
    }
    let len = (json.len() as u32).to_be_bytes();
    stream.write_all(&len).map_err(ProtocolError::from_io)?;
    stream.write_all(&json).map_err(ProtocolError::from_io)?;
    stream.flush().map_err(ProtocolError::from_io)?;
    Ok(())
}

/// Read one raw frame body from a stream.
///
/// Returns [`ProtocolError::Closed`] when the peer disconnects between frames.
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).map_err(ProtocolError::from_io)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).map_err(ProtocolError::from_io)?;
    Ok(body)
}

/// Read and decode one frame.
pub fn read_message<T: DeserializeOwned, R: Read>(stream: &mut R) -> Result<T, ProtocolError> {
    let body = read_frame(stream)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn request(command: &str) -> CommandRequest {
        CommandRequest::bare(command)
    }

    #[test]
    fn dotted_command_splits_into_target_and_verb() {
        let cmd = Command::parse(request("hv.set")).unwrap();
        assert_eq!(cmd.target, Target::Module("hv".into()));
        assert_eq!(cmd.verb, "set");
    }

    #[test]
    fn bare_command_addresses_controller() {
        let cmd = Command::parse(request(" stop ")).unwrap();
        assert_eq!(cmd.target, Target::Controller);
        assert_eq!(cmd.verb, "stop");

        let cmd = Command::parse(request("controller.stop")).unwrap();
        assert_eq!(cmd.target, Target::Controller);
    }

    #[test]
    fn empty_command_rejected() {
        assert!(matches!(
            Command::parse(request("   ")),
            Err(ProtocolError::EmptyCommand)
        ));
    }

    #[test]
    fn missing_or_null_option_yields_empty_options() {
        let req: CommandRequest = serde_json::from_str(r#"{"command":"hk.read","option":null}"#).unwrap();
        let cmd = Command::parse(req).unwrap();
        assert!(cmd.options.is_empty());
    }

    #[test]
    fn options_accept_numeric_strings() {
        let opts = Options::new().with("ch", "1").with("value_in_mV", 1200.5);
        assert_eq!(opts.integer("ch"), Ok(1));
        assert_eq!(opts.number("value_in_mV"), Ok(1200.5));
        assert_eq!(opts.integer("missing"), Err(OptionError::Missing("missing".into())));
        assert!(matches!(
            Options::new().with("ch", "one").integer("ch"),
            Err(OptionError::Invalid { .. })
        ));
    }

    #[test]
    fn non_finite_options_rejected() {
        for text in ["NaN", "nan", "inf", "-infinity"] {
            let opts = Options::new().with("ch", text).with("value_in_mV", text);
            assert!(matches!(opts.integer("ch"), Err(OptionError::Invalid { .. })), "{text}");
            assert!(matches!(opts.number("value_in_mV"), Err(OptionError::Invalid { .. })), "{text}");
        }
        assert!(matches!(
            Options::new().with("ch", "1e300").integer("ch"),
            Err(OptionError::Invalid { .. })
        ));
        assert_eq!(Options::new().with("ch", "-1.9").integer("ch"), Ok(-1));
    }

    #[test]
    fn unserializable_field_becomes_null() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys cannot be JSON object keys");
        let reply = Reply::ok().with("bad", map).with("good", 1);
        assert_eq!(reply.field("bad"), Some(&Value::Null));
        assert_eq!(reply.field("good"), Some(&json!(1)));
    }

    #[test]
    fn reply_frame_stamps_subsystem_and_flattens_fields() {
        let frame = Reply::ok()
            .with_message("hv.on executed")
            .with("ch", 1)
            .into_frame("hv");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"status":"ok","message":"hv.on executed","subsystem":"hv","ch":1})
        );
    }

    #[test]
    fn error_reply_drops_payload() {
        let frame = Reply::error("bad").with("ignored", true).into_frame("hv");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"status":"error","message":"bad","subsystem":"hv"}));
    }

    #[test]
    fn foreign_reply_without_subsystem_decodes() {
        let frame: ReplyFrame =
            serde_json::from_str(r#"{"status":"ok","daqStatus":"Paused","nEvents":3}"#).unwrap();
        assert_eq!(frame.subsystem, None);
        let reply = Reply::from(frame);
        assert!(reply.is_ok());
        assert_eq!(reply.field("daqStatus"), Some(&json!("Paused")));
    }

    #[test]
    fn unknown_status_is_an_error() {
        let frame: ReplyFrame = serde_json::from_str(r#"{"status":"weird"}"#).unwrap();
        assert_eq!(frame.status, ReplyStatus::Error);
        let frame: ReplyFrame = serde_json::from_str("{}").unwrap();
        assert!(!Reply::from(frame).is_ok());
    }

    #[test]
    fn frame_round_trip_over_stream() {
        let mut buffer = Vec::new();
        let req = CommandRequest::bare("daq.status").with_options(Options::new().with("x", 1));
        write_frame(&mut buffer, &req).unwrap();
        assert_eq!(&buffer[..4], &((buffer.len() - 4) as u32).to_be_bytes());

        let decoded: CommandRequest = read_message(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut bytes = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(matches!(
            read_frame(&mut Cursor::new(bytes)),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn eof_between_frames_is_closed() {
        assert!(matches!(
            read_frame(&mut Cursor::new(Vec::<u8>::new())),
            Err(ProtocolError::Closed)
        ));
    }
}
