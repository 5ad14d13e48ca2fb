//! The command tree.
//!
//! Each variant corresponds to one wire tag (see [`crate::tags`]). Commands
//! are immutable values: builders in the `jsproxy` crate produce them and
//! sessions consume them once when they are encoded for transmission.

use indexmap::IndexMap;
use serde_json::Value;

/// Largest result-conversion depth the remote side honors.
pub const MAX_CALLBACK_DEPTH: u32 = 5;

/// The two remote roots every chain starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootName {
    /// The remote global namespace.
    Window,
    /// The host element the remote view renders into.
    Element,
}

impl RootName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootName::Window => "window",
            RootName::Element => "element",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "window" => Some(RootName::Window),
            "element" => Some(RootName::Element),
            _ => None,
        }
    }
}

/// Kind of an injected asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    /// Wire tag used for this asset kind.
    pub fn tag(&self) -> &'static str {
        match self {
            AssetKind::Css => "load_css",
            AssetKind::Js => "load_js",
        }
    }
}

/// One node of the remote operation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `window` or `element`. Must be dereferenced before use.
    Root(RootName),
    /// `target[key]`.
    Get {
        target: Box<Command>,
        key: Box<Command>,
    },
    /// `target[method](...args)`, with `target` bound as `this`.
    Call {
        target: Box<Command>,
        method: String,
        args: Vec<Command>,
    },
    /// `callee(...args)` where `callee` is itself a computed value.
    Apply {
        callee: Box<Command>,
        args: Vec<Command>,
    },
    /// `target[key] = value`; evaluates to `target`.
    Set {
        target: Box<Command>,
        key: Box<Command>,
        value: Box<Command>,
    },
    /// `new ctor(...args)`.
    New {
        ctor: Box<Command>,
        args: Vec<Command>,
    },
    /// Opaque JSON constant, passed through untranslated.
    Literal(Value),
    /// Array whose items are evaluated.
    List(Vec<Command>),
    /// Object whose values are evaluated.
    Dict(IndexMap<String, Command>),
    /// Binary payload as lowercase hex text.
    Bytes(String),
    /// A remote-invocable function that reports back to host callback `id`.
    Callback {
        id: u64,
        data: Value,
        depth: u32,
        segmented: Option<u64>,
    },
    /// Evaluate `target` and drop the result.
    Discard(Box<Command>),
    /// Inject a stylesheet or script.
    LoadAsset {
        kind: AssetKind,
        name: String,
        text: String,
    },
}

impl Command {
    pub fn window() -> Self {
        Command::Root(RootName::Window)
    }

    pub fn element() -> Self {
        Command::Root(RootName::Element)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Command::Literal(value.into())
    }

    pub fn get(target: Command, key: impl Into<Command>) -> Self {
        Command::Get {
            target: Box::new(target),
            key: Box::new(key.into()),
        }
    }

    pub fn call(target: Command, method: impl Into<String>, args: Vec<Command>) -> Self {
        Command::Call {
            target: Box::new(target),
            method: method.into(),
            args,
        }
    }

    pub fn apply(callee: Command, args: Vec<Command>) -> Self {
        Command::Apply {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn set(target: Command, key: impl Into<Command>, value: impl Into<Command>) -> Self {
        Command::Set {
            target: Box::new(target),
            key: Box::new(key.into()),
            value: Box::new(value.into()),
        }
    }

    pub fn new_object(ctor: Command, args: Vec<Command>) -> Self {
        Command::New {
            ctor: Box::new(ctor),
            args,
        }
    }

    pub fn bytes(data: &[u8]) -> Self {
        Command::Bytes(hex::encode(data))
    }

    pub fn discard(target: Command) -> Self {
        Command::Discard(Box::new(target))
    }

    pub fn load_asset(kind: AssetKind, name: impl Into<String>, text: impl Into<String>) -> Self {
        Command::LoadAsset {
            kind,
            name: name.into(),
            text: text.into(),
        }
    }

    /// Wire tag of this node, or `None` for a bare primitive literal.
    pub fn tag(&self) -> Option<&'static str> {
        Some(match self {
            Command::Root(name) => name.as_str(),
            Command::Get { .. } => "get",
            Command::Call { .. } => "method",
            Command::Apply { .. } => "function",
            Command::Set { .. } => "set",
            Command::New { .. } => "new",
            Command::Literal(v) if v.is_array() || v.is_object() => "id",
            Command::Literal(_) => return None,
            Command::List(_) => "list",
            Command::Dict(_) => "dict",
            Command::Bytes(_) => "bytes",
            Command::Callback { .. } => "callback",
            Command::Discard(_) => "null",
            Command::LoadAsset { kind, .. } => kind.tag(),
        })
    }

    /// True for nodes that name a remote location a chain can continue from.
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Command::Literal(_))
    }

    /// Decodes the bytes of a [`Command::Bytes`] node.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Command::Bytes(digits) => hex::decode(digits).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        Command::Literal(Value::String(s.to_string()))
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        Command::Literal(Value::String(s))
    }
}

impl From<i64> for Command {
    fn from(n: i64) -> Self {
        Command::Literal(Value::from(n))
    }
}

impl From<bool> for Command {
    fn from(b: bool) -> Self {
        Command::Literal(Value::Bool(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_follow_wire_names() {
        assert_eq!(Command::window().tag(), Some("window"));
        assert_eq!(Command::get(Command::element(), "x").tag(), Some("get"));
        assert_eq!(Command::call(Command::window(), "f", vec![]).tag(), Some("method"));
        assert_eq!(Command::literal(3).tag(), None);
        assert_eq!(Command::literal(json!([1])).tag(), Some("id"));
        assert_eq!(Command::discard(Command::window()).tag(), Some("null"));
    }

    #[test]
    fn bytes_keep_hex_text() {
        let cmd = Command::bytes(&[0, 255]);
        assert_eq!(cmd, Command::Bytes("00ff".into()));
        assert_eq!(cmd.as_bytes(), Some(vec![0, 255]));
    }
}
