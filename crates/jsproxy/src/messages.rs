//! Wire message envelopes.
//!
//! Both directions share the `{indicator, payload}` shape. Outbound payloads
//! are built here; inbound payloads are parsed into [`Inbound`].

use crate::callback::CallbackEvent;
use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const COMMANDS: &str = "commands";
pub const CM_FRAGMENT: &str = "cm_fragment";
pub const CM_FINAL: &str = "cm_final";
pub const RESULTS: &str = "results";
pub const CALLBACK_RESULTS: &str = "callback_results";
pub const JCB_RESULTS: &str = "jcb_results";
pub const JCB_FINAL: &str = "jcb_final";
pub const RENDERED: &str = "rendered";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub indicator: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(indicator: impl Into<String>, payload: Value) -> Self {
        Envelope {
            indicator: indicator.into(),
            payload,
        }
    }

    /// `[id, commands, depth]`.
    pub fn commands(id: u64, commands: Vec<Value>, depth: u32) -> Self {
        Envelope::new(COMMANDS, json!([id, commands, depth]))
    }

    /// `[id, results]`, or `[id, results, error]` when the batch failed.
    pub fn results(id: u64, results: Value, error: Option<&str>) -> Self {
        let payload = match error {
            Some(msg) => json!([id, results, msg]),
            None => json!([id, results]),
        };
        Envelope::new(RESULTS, payload)
    }

    pub fn callback_results(id: u64, data: Value, arguments: Value, counter: u64) -> Self {
        Envelope::new(CALLBACK_RESULTS, json!([id, data, arguments, counter]))
    }

    pub fn rendered() -> Self {
        Envelope::new(RENDERED, Value::Bool(true))
    }

    pub fn to_json(&self) -> Result<String, ProxyError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProxyError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Results {
        id: u64,
        value: Value,
        error: Option<String>,
    },
    CallbackResults(CallbackEvent),
    Fragment(String),
    Final(String),
    Rendered(bool),
    Unknown(String),
}

fn protocol(indicator: &str, why: &str, payload: &Value) -> ProxyError {
    ProxyError::Protocol(format!("{} payload {}: {}", indicator, why, payload))
}

fn id_at(indicator: &str, items: &[Value], payload: &Value) -> Result<u64, ProxyError> {
    items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| protocol(indicator, "must start with a correlation id", payload))
}

fn text_payload(indicator: &str, payload: &Value) -> Result<String, ProxyError> {
    payload
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| protocol(indicator, "must be a string", payload))
}

impl Inbound {
    pub fn parse(envelope: &Envelope) -> Result<Self, ProxyError> {
        let indicator = envelope.indicator.as_str();
        let payload = &envelope.payload;
        match indicator {
            RESULTS => {
                let items = payload
                    .as_array()
                    .ok_or_else(|| protocol(indicator, "must be a list", payload))?;
                if items.len() < 2 || items.len() > 3 {
                    return Err(protocol(indicator, "must have 2 or 3 elements", payload));
                }
                let id = id_at(indicator, items, payload)?;
                let error = match items.get(2) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                };
                Ok(Inbound::Results {
                    id,
                    value: items[1].clone(),
                    error,
                })
            }
            CALLBACK_RESULTS => parse_callback_results(payload).map(Inbound::CallbackResults),
            JCB_RESULTS => text_payload(indicator, payload).map(Inbound::Fragment),
            JCB_FINAL => text_payload(indicator, payload).map(Inbound::Final),
            RENDERED => payload
                .as_bool()
                .map(Inbound::Rendered)
                .ok_or_else(|| protocol(indicator, "must be a boolean", payload)),
            other => Ok(Inbound::Unknown(other.to_string())),
        }
    }
}

/// Parses a `callback_results` payload, either direct or reassembled.
///
/// The full shape is `[id, data, arguments, counter]`; trailing elements
/// may be missing, in which case they default to `null` and `0`.
pub fn parse_callback_results(payload: &Value) -> Result<CallbackEvent, ProxyError> {
    let indicator = CALLBACK_RESULTS;
    let items = payload
        .as_array()
        .filter(|items| !items.is_empty() && items.len() <= 4)
        .ok_or_else(|| protocol(indicator, "must be a list of 1 to 4 elements", payload))?;
    let id = id_at(indicator, items, payload)?;
    let counter = match items.get(3) {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| protocol(indicator, "counter must be an integer", payload))?,
    };
    Ok(CallbackEvent {
        id,
        data: items.get(1).cloned().unwrap_or(Value::Null),
        arguments: items.get(2).cloned().unwrap_or(Value::Null),
        counter,
    })
}
