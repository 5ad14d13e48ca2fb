//! Command validator.
//!
//! Works on the raw wire representation (`serde_json::Value`) so that
//! commands arriving from untrusted or hand-written sources are checked
//! before anything reaches the transport. Validation is pure: it either
//! returns the typed [`Command`] tree or the first problem found.

use crate::error::{invalid, CommandError};
use crate::tags::{assert_arity, tag_map};
use crate::types::{AssetKind, Command, RootName};
use indexmap::IndexMap;
use serde_json::Value;

// ── Public API ─────────────────────────────────────────────────────────────

/// Validate a batch of commands.
///
/// Every element must be a top-level (list-shaped) command. Errors include
/// the index of the failing command: `"Error in command [index = N] (reason)."`.
pub fn validate_commands(commands: &Value) -> Result<Vec<Command>, CommandError> {
    let arr = commands
        .as_array()
        .ok_or_else(|| invalid("Command batch must be an array."))?;
    arr.iter()
        .enumerate()
        .map(|(i, raw)| {
            validate_command(raw, true).map_err(|e| match e {
                CommandError::InvalidCommand(msg) => CommandError::InvalidCommand(format!(
                    "Error in command [index = {}] ({}).",
                    i, msg
                )),
                other => other,
            })
        })
        .collect()
}

/// Validate a single command.
///
/// With `top = true` the command must be list-shaped; bare values are only
/// accepted in operand positions, where they stand for themselves.
pub fn validate_command(raw: &Value, top: bool) -> Result<Command, CommandError> {
    match raw {
        Value::Array(arr) => {
            let first = arr.first().ok_or_else(|| invalid("Empty command."))?;
            let tag = first
                .as_str()
                .ok_or_else(|| invalid(format!("Command tag must be a string: {}", first)))?;
            let def = tag_map()
                .get(tag)
                .ok_or_else(|| invalid(format!("Unknown command tag: {:?}", tag)))?;
            assert_arity(def.name, &def.arity, arr.len())?;
            (def.validate_fn)(arr)
        }
        _ if top => Err(invalid(format!("Top level command must be a list: {}", raw))),
        Value::Object(_) => Err(invalid(
            "Bare mapping is ambiguous; wrap it as [\"dict\", ...] or [\"id\", ...].",
        )),
        other => Ok(Command::Literal(other.clone())),
    }
}

// ── Tag validators ─────────────────────────────────────────────────────────

fn operands(arr: &[Value], from: usize) -> Result<Vec<Command>, CommandError> {
    arr[from..]
        .iter()
        .map(|raw| validate_command(raw, false))
        .collect()
}

fn target(raw: &Value) -> Result<Box<Command>, CommandError> {
    validate_command(raw, true).map(Box::new)
}

fn text<'a>(raw: &'a Value, what: &str) -> Result<&'a str, CommandError> {
    raw.as_str()
        .ok_or_else(|| invalid(format!("{} must be a string: {}", what, raw)))
}

pub(crate) fn root(arr: &[Value]) -> Result<Command, CommandError> {
    let name = arr[0].as_str().and_then(RootName::from_str);
    name.map(Command::Root)
        .ok_or_else(|| invalid(format!("Unknown root: {}", arr[0])))
}

pub(crate) fn get(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::Get {
        target: target(&arr[1])?,
        key: Box::new(validate_command(&arr[2], false)?),
    })
}

pub(crate) fn method(arr: &[Value]) -> Result<Command, CommandError> {
    let target = target(&arr[1])?;
    let method = text(&arr[2], "Method name")?.to_string();
    Ok(Command::Call {
        target,
        method,
        args: operands(arr, 3)?,
    })
}

pub(crate) fn function(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::Apply {
        callee: target(&arr[1])?,
        args: operands(arr, 2)?,
    })
}

pub(crate) fn set(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::Set {
        target: target(&arr[1])?,
        key: Box::new(validate_command(&arr[2], false)?),
        value: Box::new(validate_command(&arr[3], false)?),
    })
}

pub(crate) fn new(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::New {
        ctor: target(&arr[1])?,
        args: operands(arr, 2)?,
    })
}

pub(crate) fn id(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::Literal(arr[1].clone()))
}

pub(crate) fn list(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::List(operands(arr, 1)?))
}

pub(crate) fn dict(arr: &[Value]) -> Result<Command, CommandError> {
    let map = arr[1]
        .as_object()
        .ok_or_else(|| invalid(format!("\"dict\" operand must be an object: {}", arr[1])))?;
    let mut entries = IndexMap::with_capacity(map.len());
    for (k, v) in map {
        entries.insert(k.clone(), validate_command(v, false)?);
    }
    Ok(Command::Dict(entries))
}

pub(crate) fn bytes(arr: &[Value]) -> Result<Command, CommandError> {
    let digits = text(&arr[1], "Hex payload")?;
    hex::decode(digits)?;
    Ok(Command::Bytes(digits.to_ascii_lowercase()))
}

pub(crate) fn callback(arr: &[Value]) -> Result<Command, CommandError> {
    let id = arr[1]
        .as_u64()
        .ok_or_else(|| invalid(format!("Callback id must be an integer: {}", arr[1])))?;
    let depth = arr[3]
        .as_u64()
        .and_then(|d| u32::try_from(d).ok())
        .ok_or_else(|| invalid(format!("Callback depth must be an integer: {}", arr[3])))?;
    let segmented = match arr.get(4) {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_u64() {
            Some(n) if n > 0 => Some(n),
            _ => {
                return Err(invalid(format!(
                    "Segment size must be a positive integer: {}",
                    raw
                )))
            }
        },
    };
    Ok(Command::Callback {
        id,
        data: arr[2].clone(),
        depth,
        segmented,
    })
}

pub(crate) fn discard(arr: &[Value]) -> Result<Command, CommandError> {
    Ok(Command::Discard(Box::new(validate_command(&arr[1], false)?)))
}

pub(crate) fn load_asset(arr: &[Value]) -> Result<Command, CommandError> {
    let kind = match arr[0].as_str() {
        Some("load_css") => AssetKind::Css,
        _ => AssetKind::Js,
    };
    Ok(Command::LoadAsset {
        kind,
        name: text(&arr[1], "Asset name")?.to_string(),
        text: text(&arr[2], "Asset text")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn err_of(raw: Value, top: bool) -> String {
        validate_command(&raw, top).unwrap_err().to_string()
    }

    #[test]
    fn rejects_non_list_at_top() {
        assert!(err_of(json!("window"), true).contains("Top level command must be a list"));
        assert!(err_of(json!(42), true).contains("Top level command must be a list"));
    }

    #[test]
    fn bare_primitive_operand_is_literal() {
        assert_eq!(
            validate_command(&json!("abc"), false).unwrap(),
            Command::Literal(json!("abc"))
        );
        assert_eq!(
            validate_command(&json!(null), false).unwrap(),
            Command::Literal(Value::Null)
        );
    }

    #[test]
    fn bare_mapping_operand_is_ambiguous() {
        assert!(err_of(json!({"a": 1}), false).contains("ambiguous"));
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(
            err_of(json!(["frobnicate", 1]), true),
            "Invalid command: Unknown command tag: \"frobnicate\""
        );
        assert!(err_of(json!([1, 2, 3]), true).contains("tag must be a string"));
        assert!(err_of(json!([]), true).contains("Empty command"));
    }

    #[test]
    fn target_must_be_addressable() {
        assert!(err_of(json!(["get", "window", "x"]), true).contains("Top level command"));
        assert!(err_of(json!(["method", 7, "f"]), true).contains("Top level command"));
    }

    #[test]
    fn method_name_must_be_text() {
        assert!(err_of(json!(["method", ["window"], 3]), true).contains("Method name"));
    }

    #[test]
    fn root_takes_no_operands() {
        assert!(err_of(json!(["window", 1]), true).contains("expects 0 operands"));
    }

    #[test]
    fn callback_shapes() {
        let cmd = validate_command(&json!(["callback", 3, {"k": 1}, 2]), true).unwrap();
        assert_eq!(
            cmd,
            Command::Callback { id: 3, data: json!({"k": 1}), depth: 2, segmented: None }
        );
        let cmd = validate_command(&json!(["callback", 3, null, 1, 100]), true).unwrap();
        assert!(matches!(cmd, Command::Callback { segmented: Some(100), .. }));
        assert!(err_of(json!(["callback", "x", null, 1]), true).contains("Callback id"));
        assert!(err_of(json!(["callback", 1, null, 1.5]), true).contains("Callback depth"));
        assert!(err_of(json!(["callback", 1, null, 1, 0]), true).contains("Segment size"));
    }

    #[test]
    fn bytes_must_be_hex() {
        assert_eq!(
            validate_command(&json!(["bytes", "12FF"]), true).unwrap(),
            Command::Bytes("12ff".into())
        );
        assert!(err_of(json!(["bytes", "12f"]), true).contains("Invalid hex payload"));
        assert!(err_of(json!(["bytes", "zz"]), true).contains("Invalid hex payload"));
    }

    #[test]
    fn load_asset_takes_two_strings() {
        let cmd = validate_command(&json!(["load_css", "a.css", "p {}"]), true).unwrap();
        assert_eq!(cmd, Command::load_asset(AssetKind::Css, "a.css", "p {}"));
        assert!(err_of(json!(["load_js", "a.js"]), true).contains("expects 2 operands"));
        assert!(err_of(json!(["load_js", "a.js", 5]), true).contains("Asset text"));
    }

    #[test]
    fn batch_errors_carry_index() {
        let err = validate_commands(&json!([["window"], "oops"])).unwrap_err();
        assert!(err.to_string().starts_with("Invalid command: Error in command [index = 1]"));
        assert!(validate_commands(&json!({"a": 1})).is_err());
    }
}
