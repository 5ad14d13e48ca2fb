//! Values on the remote heap.

use super::Interpreter;
use super::RemoteError;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

pub type Array = Rc<RefCell<Vec<RemoteValue>>>;
pub type Object = Rc<RefCell<IndexMap<String, RemoteValue>>>;

/// Native function body: `(interpreter, this, args) -> value`.
pub type NativeFn =
    dyn Fn(&mut Interpreter, &RemoteValue, Vec<RemoteValue>) -> Result<RemoteValue, RemoteError>;

pub enum FunctionKind {
    Native(Box<NativeFn>),
    /// Reports each invocation back to host callback `id`.
    Callback {
        id: u64,
        data: Value,
        depth: u32,
        segmented: Option<u64>,
        counter: Cell<u64>,
    },
}

pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    /// Own properties (`prototype`, static members).
    pub properties: Object,
}

impl Function {
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Interpreter, &RemoteValue, Vec<RemoteValue>) -> Result<RemoteValue, RemoteError>
            + 'static,
    {
        Function {
            name: name.into(),
            kind: FunctionKind::Native(Box::new(body)),
            properties: Rc::new(RefCell::new(IndexMap::new())),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FunctionKind::Native(_) => write!(f, "function {}() {{ [native code] }}", self.name),
            FunctionKind::Callback { id, .. } => {
                write!(f, "function callback{}() {{ [host] }}", id)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum RemoteValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Bytes(Rc<Vec<u8>>),
    Array(Array),
    Object(Object),
    Function(Rc<Function>),
}

impl RemoteValue {
    pub fn object() -> Self {
        RemoteValue::Object(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn array(items: Vec<RemoteValue>) -> Self {
        RemoteValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn function(f: Function) -> Self {
        RemoteValue::Function(Rc::new(f))
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RemoteValue::Null,
            Value::Bool(b) => RemoteValue::Bool(*b),
            Value::Number(n) => RemoteValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RemoteValue::Str(s.clone()),
            Value::Array(items) => RemoteValue::array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => RemoteValue::Object(Rc::new(RefCell::new(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ))),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            RemoteValue::Undefined => "undefined",
            RemoteValue::Bool(_) => "boolean",
            RemoteValue::Number(_) => "number",
            RemoteValue::Str(_) => "string",
            RemoteValue::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            RemoteValue::Undefined | RemoteValue::Null => false,
            RemoteValue::Bool(b) => *b,
            RemoteValue::Number(n) => *n != 0.0 && !n.is_nan(),
            RemoteValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Object-like values a constructor may return in place of `this`.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            RemoteValue::Array(_)
                | RemoteValue::Object(_)
                | RemoteValue::Function(_)
                | RemoteValue::Bytes(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RemoteValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Property-key form of a value, as `target[key]` would compute it.
    pub fn to_key(&self) -> String {
        self.to_display()
    }

    /// `String(value)`.
    pub fn to_display(&self) -> String {
        match self {
            RemoteValue::Undefined => "undefined".into(),
            RemoteValue::Null => "null".into(),
            RemoteValue::Bool(b) => b.to_string(),
            RemoteValue::Number(n) => number_text(*n),
            RemoteValue::Str(s) => s.clone(),
            RemoteValue::Bytes(b) => b.iter().map(u8::to_string).collect::<Vec<_>>().join(","),
            RemoteValue::Array(items) => items
                .borrow()
                .iter()
                .map(|v| match v {
                    RemoteValue::Undefined | RemoteValue::Null => String::new(),
                    other => other.to_display(),
                })
                .collect::<Vec<_>>()
                .join(","),
            RemoteValue::Object(_) => "[object Object]".into(),
            RemoteValue::Function(f) => format!("{:?}", f),
        }
    }

    /// Identity for heap values, equality for primitives.
    pub fn same_value(&self, other: &RemoteValue) -> bool {
        match (self, other) {
            (RemoteValue::Undefined, RemoteValue::Undefined) => true,
            (RemoteValue::Null, RemoteValue::Null) => true,
            (RemoteValue::Bool(a), RemoteValue::Bool(b)) => a == b,
            (RemoteValue::Number(a), RemoteValue::Number(b)) => a == b,
            (RemoteValue::Str(a), RemoteValue::Str(b)) => a == b,
            (RemoteValue::Bytes(a), RemoteValue::Bytes(b)) => Rc::ptr_eq(a, b),
            (RemoteValue::Array(a), RemoteValue::Array(b)) => Rc::ptr_eq(a, b),
            (RemoteValue::Object(a), RemoteValue::Object(b)) => Rc::ptr_eq(a, b),
            (RemoteValue::Function(a), RemoteValue::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn number_text(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Largest conversion depth honored by [`json_safe`].
pub const MAX_SAFE_DEPTH: u32 = 5;

/// Clamps a requested depth into `0..=5`; anything unusable becomes 0.
pub fn check_level(level: &Value) -> u32 {
    match level.as_f64() {
        Some(n) if n > 0.0 => (n as u32).min(MAX_SAFE_DEPTH),
        _ => 0,
    }
}

/// Converts a remote value to JSON, descending at most `depth` levels.
///
/// Primitives always convert. Composites convert only while depth remains;
/// below that they become `null`, and `null` members are dropped from
/// objects. Integral numbers come back as JSON integers.
pub fn json_safe(value: &RemoteValue, depth: u32) -> Value {
    match value {
        RemoteValue::Bool(b) => Value::Bool(*b),
        RemoteValue::Number(n) => json_number(*n),
        RemoteValue::Str(s) => Value::String(s.clone()),
        RemoteValue::Undefined | RemoteValue::Null => Value::Null,
        _ if depth == 0 => Value::Null,
        RemoteValue::Bytes(b) => Value::String(hex::encode(b.as_slice())),
        RemoteValue::Array(items) => Value::Array(
            items
                .borrow()
                .iter()
                .map(|item| json_safe(item, depth - 1))
                .collect(),
        ),
        RemoteValue::Object(map) => object_json(map, depth),
        RemoteValue::Function(f) => object_json(&f.properties, depth),
    }
}

fn object_json(map: &Object, depth: u32) -> Value {
    let mut out = serde_json::Map::new();
    for (k, v) in map.borrow().iter() {
        let jv = json_safe(v, depth - 1);
        if !jv.is_null() {
            out.insert(k.clone(), jv);
        }
    }
    Value::Object(out)
}

fn json_number(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
