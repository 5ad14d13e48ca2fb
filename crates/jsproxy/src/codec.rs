//! Value codec: host values to and from their wire representation.
//!
//! [`HostValue`] is the boundary type. Data and command references are
//! distinct variants from the start, so there is never any guessing about
//! whether a list is data or a sub-command: data lists and maps always
//! encode as explicit `list` / `dict` nodes.

use crate::callback::Callable;
use indexmap::IndexMap;
use jsproxy_command::{validate_command, Command, CommandError};
use serde::Serialize;
use serde_json::{Number, Value};

/// Deepest nesting the codec will walk before giving up.
pub const MAX_NESTING: usize = 128;

/// A value on the host side of the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Map(IndexMap<String, HostValue>),
    Bytes(Vec<u8>),
    /// A reference into the remote object graph.
    Command(Command),
    /// A host function; must be registered with a session before encoding.
    Callable(Callable),
}

impl HostValue {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        HostValue::Bytes(data.into())
    }

    /// Converts any serializable value through its JSON form.
    ///
    /// Values serde cannot express as JSON fail with
    /// [`CommandError::UntranslatableValue`] naming the Rust type.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, CommandError> {
        serde_json::to_value(value)
            .map(|v| HostValue::from_json(&v))
            .map_err(|_| CommandError::UntranslatableValue {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// Converts plain JSON data.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Number(n) => number(n),
            Value::String(s) => HostValue::Str(s.clone()),
            Value::Array(items) => {
                HostValue::List(items.iter().map(HostValue::from_json).collect())
            }
            Value::Object(map) => HostValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), HostValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::List(_) => "list",
            HostValue::Map(_) => "map",
            HostValue::Bytes(_) => "bytes",
            HostValue::Command(_) => "command",
            HostValue::Callable(_) => "callable",
        }
    }
}

fn number(n: &Number) -> HostValue {
    if let Some(i) = n.as_i64() {
        HostValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        HostValue::Float(u as f64)
    } else {
        HostValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

// ── Encoding ───────────────────────────────────────────────────────────────

/// Lowers a host value to a command node.
///
/// Callables and non-finite floats are rejected with
/// [`CommandError::UntranslatableValue`].
pub fn encode(value: &HostValue) -> Result<Command, CommandError> {
    encode_at(value, 0)
}

fn untranslatable(type_name: impl Into<String>) -> CommandError {
    CommandError::UntranslatableValue {
        type_name: type_name.into(),
    }
}

fn encode_at(value: &HostValue, nesting: usize) -> Result<Command, CommandError> {
    if nesting > MAX_NESTING {
        return Err(untranslatable(format!(
            "{} nested deeper than {}",
            value.kind(),
            MAX_NESTING
        )));
    }
    Ok(match value {
        HostValue::Null => Command::Literal(Value::Null),
        HostValue::Bool(b) => Command::Literal(Value::Bool(*b)),
        HostValue::Int(i) => Command::Literal(Value::from(*i)),
        HostValue::Float(f) => {
            let n = Number::from_f64(*f).ok_or_else(|| untranslatable(format!("f64 ({})", f)))?;
            Command::Literal(Value::Number(n))
        }
        HostValue::Str(s) => Command::Literal(Value::String(s.clone())),
        HostValue::List(items) => Command::List(
            items
                .iter()
                .map(|item| encode_at(item, nesting + 1))
                .collect::<Result<_, _>>()?,
        ),
        HostValue::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                out.insert(k.clone(), encode_at(v, nesting + 1)?);
            }
            Command::Dict(out)
        }
        HostValue::Bytes(data) => Command::bytes(data),
        HostValue::Command(cmd) => cmd.clone(),
        HostValue::Callable(c) => return Err(untranslatable(format!("callable {:?}", c.key()))),
    })
}

/// Encodes a host value straight to wire JSON.
pub fn encode_wire(value: &HostValue) -> Result<Value, CommandError> {
    encode(value).map(|cmd| cmd.to_wire())
}

// ── Decoding ───────────────────────────────────────────────────────────────

/// Decodes wire JSON produced by [`encode_wire`].
///
/// Data nodes (`id`, `list`, `dict`, `bytes`, bare primitives) become data
/// again; any other command shape comes back as [`HostValue::Command`].
pub fn decode(wire: &Value) -> Result<HostValue, CommandError> {
    let cmd = validate_command(wire, false)?;
    Ok(decode_command(cmd))
}

fn decode_command(cmd: Command) -> HostValue {
    match cmd {
        Command::Literal(v) => HostValue::from_json(&v),
        Command::List(items) => {
            let values: Vec<HostValue> = items.into_iter().map(decode_command).collect();
            HostValue::List(values)
        }
        Command::Dict(entries) => HostValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, decode_command(v)))
                .collect(),
        ),
        Command::Bytes(digits) => match hex::decode(&digits) {
            Ok(data) => HostValue::Bytes(data),
            Err(_) => HostValue::Command(Command::Bytes(digits)),
        },
        other => HostValue::Command(other),
    }
}

/// Encodes binary data as its wire form.
pub fn encode_bytes(data: &[u8]) -> Value {
    Command::bytes(data).to_wire()
}

/// Decodes the wire form of binary data.
pub fn decode_bytes(wire: &Value) -> Result<Vec<u8>, CommandError> {
    match validate_command(wire, false)? {
        Command::Bytes(digits) => Ok(hex::decode(digits)?),
        other => Err(CommandError::InvalidCommand(format!(
            "expected bytes, got {}",
            other.tag().unwrap_or("literal")
        ))),
    }
}

// ── Conversions ────────────────────────────────────────────────────────────

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for HostValue {
            fn from(n: $t) -> Self {
                HostValue::Int(i64::from(n))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! from_wide_int {
    ($($t:ty),*) => {
        $(impl From<$t> for HostValue {
            /// Integers outside the `i64` range become the nearest `f64`.
            fn from(n: $t) -> Self {
                match i64::try_from(n) {
                    Ok(i) => HostValue::Int(i),
                    Err(_) => HostValue::Float(n as f64),
                }
            }
        })*
    };
}

from_wide_int!(u64, usize, isize, i128, u128);

impl From<f32> for HostValue {
    fn from(n: f32) -> Self {
        HostValue::Float(f64::from(n))
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Float(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<&[u8]> for HostValue {
    fn from(data: &[u8]) -> Self {
        HostValue::Bytes(data.to_vec())
    }
}

impl From<Command> for HostValue {
    fn from(cmd: Command) -> Self {
        HostValue::Command(cmd)
    }
}

impl From<Callable> for HostValue {
    fn from(c: Callable) -> Self {
        HostValue::Callable(c)
    }
}

impl From<Value> for HostValue {
    fn from(v: Value) -> Self {
        HostValue::from_json(&v)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(HostValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn primitives_pass_through() {
        assert_eq!(encode_wire(&HostValue::Int(3)).unwrap(), json!(3));
        assert_eq!(encode_wire(&"x".into()).unwrap(), json!("x"));
        assert_eq!(encode_wire(&HostValue::Null).unwrap(), json!(null));
        assert_eq!(encode_wire(&true.into()).unwrap(), json!(true));
    }

    #[test]
    fn composites_are_tagged() {
        let v: HostValue = vec![HostValue::Int(1), Command::window().into()].into();
        assert_eq!(encode_wire(&v).unwrap(), json!(["list", 1, ["window"]]));
        let mut m = IndexMap::new();
        m.insert("a".to_string(), HostValue::bytes(vec![0xab]));
        assert_eq!(
            encode_wire(&HostValue::Map(m)).unwrap(),
            json!(["dict", {"a": ["bytes", "ab"]}])
        );
    }

    #[test]
    fn fixed_width_numbers_are_coerced() {
        assert_eq!(HostValue::from(7u8), HostValue::Int(7));
        assert_eq!(HostValue::from(-7i16), HostValue::Int(-7));
        assert_eq!(HostValue::from(0.5f32), HostValue::Float(0.5));
        assert_eq!(HostValue::from(u64::MAX), HostValue::Float(u64::MAX as f64));
        assert_eq!(HostValue::from(i128::from(i64::MIN)), HostValue::Int(i64::MIN));
    }

    #[test]
    fn untranslatable_values_name_their_type() {
        let err = encode(&HostValue::Float(f64::NAN)).unwrap_err();
        assert!(matches!(
            err,
            CommandError::UntranslatableValue { ref type_name } if type_name.starts_with("f64")
        ));

        let c = Callable::new("cb", |_| Ok(()));
        let err = encode(&HostValue::List(vec![c.into()])).unwrap_err();
        assert!(err.to_string().contains("callable \"cb\""), "got: {}", err);

        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = HostValue::from_serialize(&bad).unwrap_err();
        assert!(err.to_string().contains("HashMap"), "got: {}", err);
    }

    #[test]
    fn nesting_is_capped() {
        let mut v = HostValue::Null;
        for _ in 0..(MAX_NESTING + 2) {
            v = HostValue::List(vec![v]);
        }
        assert!(matches!(encode(&v), Err(CommandError::UntranslatableValue { .. })));
    }

    #[test]
    fn decode_reverses_encode_for_data() {
        let mut m = IndexMap::new();
        m.insert("n".to_string(), HostValue::Float(1.5));
        m.insert("raw".to_string(), HostValue::bytes(vec![0, 1, 254]));
        m.insert("ref".to_string(), Command::get(Command::window(), "x").into());
        let v = HostValue::List(vec![HostValue::Map(m), HostValue::Str("s".into())]);
        let wire = encode_wire(&v).unwrap();
        assert_eq!(decode(&wire).unwrap(), v);
    }

    #[test]
    fn bytes_round_trip() {
        for data in [vec![], vec![0u8], vec![0x12, 0xff], (0..=255).collect::<Vec<u8>>()] {
            assert_eq!(decode_bytes(&encode_bytes(&data)).unwrap(), data);
        }
        assert!(decode_bytes(&json!(["window"])).is_err());
    }
}
