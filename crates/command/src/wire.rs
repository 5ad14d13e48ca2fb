//! Wire encoding of commands.
//!
//! The inverse of [`crate::validate_command`]: for every valid wire value
//! `w`, `validate_command(&w, top)?.to_wire() == w` up to hex case.

use crate::types::Command;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

fn tagged(tag: &str, capacity: usize) -> Vec<Value> {
    let mut arr = Vec::with_capacity(capacity + 1);
    arr.push(Value::String(tag.to_string()));
    arr
}

fn encode_all(out: &mut Vec<Value>, commands: &[Command]) {
    out.extend(commands.iter().map(Command::to_wire));
}

impl Command {
    /// Encodes this command as its JSON wire form.
    pub fn to_wire(&self) -> Value {
        match self {
            Command::Root(name) => Value::Array(vec![Value::String(name.as_str().into())]),
            Command::Get { target, key } => {
                let mut arr = tagged("get", 2);
                arr.push(target.to_wire());
                arr.push(key.to_wire());
                Value::Array(arr)
            }
            Command::Call {
                target,
                method,
                args,
            } => {
                let mut arr = tagged("method", 2 + args.len());
                arr.push(target.to_wire());
                arr.push(Value::String(method.clone()));
                encode_all(&mut arr, args);
                Value::Array(arr)
            }
            Command::Apply { callee, args } => {
                let mut arr = tagged("function", 1 + args.len());
                arr.push(callee.to_wire());
                encode_all(&mut arr, args);
                Value::Array(arr)
            }
            Command::Set { target, key, value } => {
                let mut arr = tagged("set", 3);
                arr.push(target.to_wire());
                arr.push(key.to_wire());
                arr.push(value.to_wire());
                Value::Array(arr)
            }
            Command::New { ctor, args } => {
                let mut arr = tagged("new", 1 + args.len());
                arr.push(ctor.to_wire());
                encode_all(&mut arr, args);
                Value::Array(arr)
            }
            Command::Literal(v) if v.is_array() || v.is_object() => {
                Value::Array(vec![Value::String("id".into()), v.clone()])
            }
            Command::Literal(v) => v.clone(),
            Command::List(items) => {
                let mut arr = tagged("list", items.len());
                encode_all(&mut arr, items);
                Value::Array(arr)
            }
            Command::Dict(entries) => {
                let map: Map<String, Value> = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect();
                Value::Array(vec![Value::String("dict".into()), Value::Object(map)])
            }
            Command::Bytes(hex) => {
                Value::Array(vec![Value::String("bytes".into()), Value::String(hex.clone())])
            }
            Command::Callback {
                id,
                data,
                depth,
                segmented,
            } => {
                let mut arr = tagged("callback", 4);
                arr.push(Value::from(*id));
                arr.push(data.clone());
                arr.push(Value::from(*depth));
                if let Some(size) = segmented {
                    arr.push(Value::from(*size));
                }
                Value::Array(arr)
            }
            Command::Discard(target) => {
                Value::Array(vec![Value::String("null".into()), target.to_wire()])
            }
            Command::LoadAsset { kind, name, text } => Value::Array(vec![
                Value::String(kind.tag().into()),
                Value::String(name.clone()),
                Value::String(text.clone()),
            ]),
        }
    }
}

impl From<&Command> for Value {
    fn from(cmd: &Command) -> Self {
        cmd.to_wire()
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_command;
    use serde_json::json;

    #[test]
    fn method_chain() {
        let cmd = Command::call(
            Command::get(Command::window(), "document"),
            "getElementById",
            vec!["x".into()],
        );
        assert_eq!(
            cmd.to_wire(),
            json!(["method", ["get", ["window"], "document"], "getElementById", "x"])
        );
    }

    #[test]
    fn composite_literal_is_wrapped() {
        assert_eq!(Command::literal(json!([1, 2])).to_wire(), json!(["id", [1, 2]]));
        assert_eq!(Command::literal(json!({"a": 1})).to_wire(), json!(["id", {"a": 1}]));
        assert_eq!(Command::literal(1.5).to_wire(), json!(1.5));
    }

    #[test]
    fn validate_reverses_encode() {
        let wire = json!([
            "set",
            ["element"],
            "cfg",
            ["dict", {"a": ["list", 1, ["bytes", "00ff"]], "cb": ["callback", 4, "d", 2, 10]}]
        ]);
        let cmd = validate_command(&wire, true).unwrap();
        assert_eq!(cmd.to_wire(), wire);
    }

    #[test]
    fn serializes_as_wire_text() {
        let text = serde_json::to_string(&Command::discard(Command::window())).unwrap();
        assert_eq!(text, r#"["null",["window"]]"#);
    }
}
