//! Wire format exchanged between the host and the worker.
//!
//! Every frame is JSON text, so both sides always own independent copies of
//! a payload. There are three kinds of frame, each on its own channel:
//!
//! * call: `["method", id, arg0, arg1, ...]` (host to worker)
//! * reply: `{"member": "method", "mId": id, "value": ...}` or the same with
//!   `"errorMsg"` instead of `"value"` (worker to host)
//! * property change: `{"member": "name", "value": ...}` (worker to host, uncorrelated)

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Host-assigned token matching a reply to its call. Never zero.
pub type CorrelationId = u64;

/// Wire name of the getter registered for a property.
pub fn getter_name(property: &str) -> String {
    format!("get_{property}")
}

/// Wire name of the setter registered for a property.
pub fn setter_name(property: &str) -> String {
    format!("set_{property}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub method: String,
    pub id: CorrelationId,
    pub args: Vec<Value>,
}

impl Serialize for CallEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.args.len()))?;
        seq.serialize_element(&self.method)?;
        seq.serialize_element(&self.id)?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CallEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut items = Vec::<Value>::deserialize(deserializer)?.into_iter();

        let method = match items.next() {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => return Err(D::Error::custom("call frame must start with a method name")),
        };
        let id = items
            .next()
            .and_then(|id| id.as_u64())
            .filter(|&id| id != 0)
            .ok_or_else(|| D::Error::custom("call frame needs a positive correlation id"))?;

        Ok(Self {
            method,
            id,
            args: items.collect(),
        })
    }
}

/// Exactly one of `value` / `errorMsg` is present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "value")]
    Value(Value),
    #[serde(rename = "errorMsg")]
    Error(String),
}

impl From<Result<Value, String>> for Outcome {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(message) => Outcome::Error(message),
        }
    }
}

impl From<Outcome> for Result<Value, String> {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Error(message) => Err(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub member: String,
    #[serde(rename = "mId")]
    pub m_id: CorrelationId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Unsolicited notification that a worker-side property was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub member: String,
    pub value: Value,
}
