//! Wire messages exchanged with the guiding server.
//!
//! Outbound commands are single JSON objects carrying `method`, `id` and an
//! optional `params` value. Inbound lines are either responses (a `result` or
//! `error` key) or events (an `Event` key); [`InboundMessage::classify`]
//! tells them apart by shape alone.


use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ProtocolDecodeWarning;

const EVENT_KEY: &str = "Event";
const RESULT_KEY: &str = "result";
const ERROR_KEY: &str = "error";
const ID_KEY: &str = "id";

/// An outbound command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest<'a> {
    /// Method name.
    pub method: &'a str,
    /// Request identifier.
    pub id: u64,
    /// Positional or named parameters; omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> CommandRequest<'a> {
    /// Builds a request, wrapping a scalar parameter as a one-element array.
    #[must_use]
    pub fn new(method: &'a str, id: u64, params: Option<Value>) -> Self {
        Self {
            method,
            id,
            params: params.map(|value| match value {
                Value::Array(_) | Value::Object(_) => value,
                scalar => Value::Array(vec![scalar]),
            }),
        }
    }

    /// Serialises the request as one compact JSON line without terminator.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error when the parameters cannot be encoded.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Server error code.
    pub code: i64,
    /// Server error message.
    pub message: String,
}

impl RemoteError {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                code: fields.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), str::to_owned),
            },
            Value::String(message) => Self {
                code: 0,
                message: message.clone(),
            },
            other => Self {
                code: 0,
                message: other.to_string(),
            },
        }
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// Identifier echoed by the server, when present and numeric.
    pub id: Option<u64>,
    /// The `result` payload or the `error` object.
    pub outcome: Result<Value, RemoteError>,
}

/// A decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    /// Value of the `Event` key.
    pub name: String,
    /// The complete event object, including the `Event` key.
    pub body: Map<String, Value>,
}

/// One inbound protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to the in-flight command.
    Response(ResponseMessage),
    /// Asynchronous notification.
    Event(EventMessage),
}

impl InboundMessage {
    /// Decodes and classifies one framed line.
    ///
    /// An `Event` key always wins, even when the object also carries a
    /// `result` or `error` key.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolDecodeWarning`] for lines that are not JSON
    /// objects or match neither shape.
    pub fn classify(line: &[u8]) -> Result<Self, ProtocolDecodeWarning> {
        let Value::Object(body) = serde_json::from_slice::<Value>(line)? else {
            return Err(ProtocolDecodeWarning::NotAnObject);
        };

        if let Some(raw_name) = body.get(EVENT_KEY) {
            let Some(name) = raw_name.as_str().map(str::to_owned) else {
                return Err(ProtocolDecodeWarning::Unrecognised(format!(
                    "non-string event name {raw_name}"
                )));
            };
            return Ok(Self::Event(EventMessage { name, body }));
        }

        let id = body.get(ID_KEY).and_then(Value::as_u64);
        let error = body.get(ERROR_KEY).filter(|value| !value.is_null());
        let outcome = match (error, body.get(RESULT_KEY)) {
            (Some(failure), _) => Err(RemoteError::from_value(failure)),
            (None, Some(result)) => Ok(result.clone()),
            (None, None) if body.contains_key(ERROR_KEY) => Ok(Value::Null),
            (None, None) => {
                let keys: Vec<&str> = body.keys().map(String::as_str).collect();
                return Err(ProtocolDecodeWarning::Unrecognised(format!(
                    "keys [{}]",
                    keys.join(", ")
                )));
            }
        };
        Ok(Self::Response(ResponseMessage { id, outcome }))
    }
}
