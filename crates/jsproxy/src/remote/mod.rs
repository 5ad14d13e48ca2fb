//! In-process implementation of the remote execution contract.
//!
//! [`Interpreter`] receives `commands` (or `cm_fragment` / `cm_final`)
//! envelopes, executes each command against a small JavaScript-like heap,
//! and queues `results`, `callback_results` and `jcb_*` envelopes for the
//! host. It is what [`crate::LoopbackTransport`] runs, and what the tests
//! use in place of a browser.

mod builtins;
mod value;

pub use value::{
    check_level, json_safe, Function, FunctionKind, NativeFn, RemoteValue, MAX_SAFE_DEPTH,
};

use crate::error::ProxyError;
use crate::messages::{self, Envelope};
use crate::segment::{split_for_send, Reassembler};
use indexmap::IndexMap;
use jsproxy_command::{validate_commands, AssetKind, Command, CommandError, RootName};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// An exception raised while executing a command.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("{0}")]
    Thrown(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAsset {
    pub kind: AssetKind,
    pub name: String,
    pub text: String,
}

pub struct Interpreter {
    window: RemoteValue,
    element: RemoteValue,
    outbox: VecDeque<Envelope>,
    commands: Reassembler,
    assets: Vec<LoadedAsset>,
    console: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let window = RemoteValue::object();
        let element = RemoteValue::object();
        builtins::install(&window, &element);
        Interpreter {
            window,
            element,
            outbox: VecDeque::new(),
            commands: Reassembler::new(),
            assets: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn window(&self) -> RemoteValue {
        self.window.clone()
    }

    pub fn element(&self) -> RemoteValue {
        self.element.clone()
    }

    /// Defines `window[name]`.
    pub fn define_global(&self, name: &str, value: RemoteValue) {
        // The window is always an object.
        let _ = set_property(&self.window, name.to_string(), value);
    }

    pub fn loaded_assets(&self) -> &[LoadedAsset] {
        &self.assets
    }

    /// Lines written through `console.log`.
    pub fn console(&self) -> &[String] {
        &self.console
    }

    pub(crate) fn log(&mut self, line: String) {
        debug!(target: "jsproxy::remote", "console.log: {}", line);
        self.console.push(line);
    }

    pub(crate) fn record_asset(&mut self, kind: AssetKind, name: String, text: String) {
        self.assets.push(LoadedAsset { kind, name, text });
    }

    /// Next envelope addressed to the host, if any.
    pub fn take_outbound(&mut self) -> Option<Envelope> {
        self.outbox.pop_front()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Handles one envelope from the host.
    pub fn receive(&mut self, envelope: &Envelope) -> Result<(), ProxyError> {
        match envelope.indicator.as_str() {
            messages::COMMANDS => self.run_batch(&envelope.payload),
            messages::CM_FRAGMENT => {
                self.commands.push(fragment_text(envelope)?);
                Ok(())
            }
            messages::CM_FINAL => {
                let payload = self.commands.finish(fragment_text(envelope)?)?;
                self.run_batch(&payload)
            }
            other => {
                warn!(indicator = other, "remote side ignoring message");
                Ok(())
            }
        }
    }

    /// Executes a `[id, commands, depth]` batch and queues its results.
    ///
    /// Execution stops at the first command that throws; the results of the
    /// commands before it are sent along with the error text.
    fn run_batch(&mut self, payload: &Value) -> Result<(), ProxyError> {
        let items = payload
            .as_array()
            .filter(|items| items.len() >= 2)
            .ok_or_else(|| ProxyError::Protocol(format!("commands payload: {}", payload)))?;
        let id = items[0]
            .as_u64()
            .ok_or_else(|| ProxyError::Protocol(format!("commands correlation id: {}", items[0])))?;
        let level = items.get(2).map(check_level).unwrap_or(0);

        let mut results = Vec::new();
        let mut error = None;
        match validate_commands(&items[1]) {
            Ok(commands) => {
                for command in &commands {
                    match self.execute(command) {
                        Ok(value) => results.push(json_safe(&value, level)),
                        Err(e) => {
                            error = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => error = Some(e.to_string()),
        }
        debug!(id, count = results.len(), failed = error.is_some(), "remote batch executed");
        self.outbox
            .push_back(Envelope::results(id, Value::Array(results), error.as_deref()));
        Ok(())
    }

    pub fn execute(&mut self, command: &Command) -> Result<RemoteValue, RemoteError> {
        Ok(match command {
            Command::Root(RootName::Window) => self.window(),
            Command::Root(RootName::Element) => self.element(),
            Command::Get { target, key } => {
                let target = self.execute(target)?;
                let key = self.execute(key)?.to_key();
                get_property(&target, &key)?
            }
            Command::Call {
                target,
                method,
                args,
            } => {
                let target = self.execute(target)?;
                let function = get_property(&target, method)?;
                let args = self.execute_all(args)?;
                if !matches!(function, RemoteValue::Function(_)) {
                    return Err(RemoteError::Type(format!(
                        "{}.{} is not a function",
                        target.type_of(),
                        method
                    )));
                }
                self.call_function(&function, &target, args)?
            }
            Command::Apply { callee, args } => {
                let function = self.execute(callee)?;
                let args = self.execute_all(args)?;
                self.call_function(&function, &RemoteValue::Undefined, args)?
            }
            Command::Set { target, key, value } => {
                let target = self.execute(target)?;
                let key = self.execute(key)?.to_key();
                let value = self.execute(value)?;
                set_property(&target, key, value)?;
                target
            }
            Command::New { ctor, args } => {
                let ctor = self.execute(ctor)?;
                let args = self.execute_all(args)?;
                self.construct(&ctor, args)?
            }
            Command::Literal(v) => RemoteValue::from_json(v),
            Command::List(items) => RemoteValue::array(self.execute_all(items)?),
            Command::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), self.execute(v)?);
                }
                RemoteValue::Object(Rc::new(RefCell::new(map)))
            }
            Command::Bytes(digits) => {
                let data = hex::decode(digits).map_err(|e| RemoteError::Thrown(e.to_string()))?;
                RemoteValue::Bytes(Rc::new(data))
            }
            Command::Callback {
                id,
                data,
                depth,
                segmented,
            } => RemoteValue::function(Function {
                name: format!("callback{}", id),
                kind: FunctionKind::Callback {
                    id: *id,
                    data: data.clone(),
                    depth: (*depth).min(MAX_SAFE_DEPTH),
                    segmented: *segmented,
                    counter: Cell::new(0),
                },
                properties: Rc::new(RefCell::new(IndexMap::new())),
            }),
            Command::Discard(target) => {
                self.execute(target)?;
                RemoteValue::Null
            }
            Command::LoadAsset { kind, name, text } => {
                self.record_asset(*kind, name.clone(), text.clone());
                RemoteValue::Null
            }
        })
    }

    fn execute_all(&mut self, commands: &[Command]) -> Result<Vec<RemoteValue>, RemoteError> {
        commands.iter().map(|c| self.execute(c)).collect()
    }

    /// Calls `function` with `this` bound.
    pub fn call_function(
        &mut self,
        function: &RemoteValue,
        this: &RemoteValue,
        args: Vec<RemoteValue>,
    ) -> Result<RemoteValue, RemoteError> {
        let function = match function {
            RemoteValue::Function(f) => Rc::clone(f),
            other => {
                return Err(RemoteError::Type(format!(
                    "{} is not a function",
                    other.to_display()
                )))
            }
        };
        match &function.kind {
            FunctionKind::Native(body) => body(self, this, args),
            FunctionKind::Callback {
                id,
                data,
                depth,
                segmented,
                counter,
            } => {
                counter.set(counter.get() + 1);
                self.report_callback(*id, data, *depth, *segmented, counter.get(), args)?;
                Ok(RemoteValue::Undefined)
            }
        }
    }

    /// Invokes a function the way an event source would.
    pub fn invoke(
        &mut self,
        function: &RemoteValue,
        args: Vec<RemoteValue>,
    ) -> Result<RemoteValue, RemoteError> {
        self.call_function(function, &RemoteValue::Undefined, args)
    }

    /// `new ctor(...args)`: a fresh object is bound as `this`, and an
    /// object-like return value replaces it.
    pub fn construct(
        &mut self,
        ctor: &RemoteValue,
        args: Vec<RemoteValue>,
    ) -> Result<RemoteValue, RemoteError> {
        let this = RemoteValue::object();
        let result = self.call_function(ctor, &this, args)?;
        Ok(if result.is_object_like() { result } else { this })
    }

    fn report_callback(
        &mut self,
        id: u64,
        data: &Value,
        depth: u32,
        segmented: Option<u64>,
        counter: u64,
        args: Vec<RemoteValue>,
    ) -> Result<(), RemoteError> {
        let arguments: IndexMap<String, RemoteValue> = args
            .into_iter()
            .enumerate()
            .map(|(i, arg)| (i.to_string(), arg))
            .collect();
        let payload = RemoteValue::array(vec![
            RemoteValue::Number(id as f64),
            RemoteValue::from_json(data),
            RemoteValue::Object(Rc::new(RefCell::new(arguments))),
            RemoteValue::Number(counter as f64),
        ]);
        let payload = json_safe(&payload, depth + 1);
        match segmented {
            None => self
                .outbox
                .push_back(Envelope::new(messages::CALLBACK_RESULTS, payload)),
            Some(size) => {
                let text = payload.to_string();
                let size = usize::try_from(size).map_err(|e| RemoteError::Thrown(e.to_string()))?;
                let segments =
                    split_for_send(&text, size).map_err(|e| RemoteError::Thrown(e.to_string()))?;
                for segment in segments {
                    let indicator = if segment.is_final {
                        messages::JCB_FINAL
                    } else {
                        messages::JCB_RESULTS
                    };
                    self.outbox
                        .push_back(Envelope::new(indicator, Value::String(segment.chunk)));
                }
            }
        }
        Ok(())
    }
}

fn fragment_text(envelope: &Envelope) -> Result<&str, ProxyError> {
    envelope.payload.as_str().ok_or_else(|| {
        ProxyError::Protocol(format!("{} payload must be a string", envelope.indicator))
    })
}

fn index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Largest length a JavaScript array can have.
const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Arrays are stored densely, so growth beyond this is refused.
const MAX_DENSE_LENGTH: usize = 1 << 24;

fn invalid_length() -> RemoteError {
    RemoteError::Thrown("RangeError: Invalid array length".to_string())
}

fn dense_length(len: usize) -> Result<usize, RemoteError> {
    if len > MAX_DENSE_LENGTH {
        return Err(RemoteError::Thrown(format!(
            "RangeError: Array length {} exceeds the supported maximum of {}",
            len, MAX_DENSE_LENGTH
        )));
    }
    Ok(len)
}

/// Checks a value assigned to `length`, which must be an integer in `0..=2^32-1`.
fn array_length(value: &RemoteValue) -> Result<usize, RemoteError> {
    let n = builtins::to_number(value);
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
        return Err(invalid_length());
    }
    dense_length(n as usize)
}

/// `target[key]`.
pub fn get_property(target: &RemoteValue, key: &str) -> Result<RemoteValue, RemoteError> {
    Ok(match target {
        RemoteValue::Undefined | RemoteValue::Null => {
            return Err(RemoteError::Type(format!(
                "Cannot read properties of {} (reading '{}')",
                target.to_display(),
                key
            )))
        }
        RemoteValue::Object(map) => map.borrow().get(key).cloned().unwrap_or_default(),
        RemoteValue::Function(f) => match f.properties.borrow().get(key) {
            Some(v) => v.clone(),
            None if key == "name" => RemoteValue::Str(f.name.clone()),
            None => RemoteValue::Undefined,
        },
        RemoteValue::Array(items) => {
            if key == "length" {
                RemoteValue::Number(items.borrow().len() as f64)
            } else if let Some(i) = index(key) {
                items.borrow().get(i).cloned().unwrap_or_default()
            } else {
                builtins::array_method(key).unwrap_or_default()
            }
        }
        RemoteValue::Str(s) => {
            if key == "length" {
                RemoteValue::Number(s.chars().count() as f64)
            } else if let Some(i) = index(key) {
                s.chars()
                    .nth(i)
                    .map(|c| RemoteValue::Str(c.to_string()))
                    .unwrap_or_default()
            } else {
                builtins::string_method(key).unwrap_or_default()
            }
        }
        RemoteValue::Bytes(data) => {
            if key == "length" {
                RemoteValue::Number(data.len() as f64)
            } else {
                index(key)
                    .and_then(|i| data.get(i))
                    .map(|b| RemoteValue::Number(f64::from(*b)))
                    .unwrap_or_default()
            }
        }
        RemoteValue::Bool(_) | RemoteValue::Number(_) => RemoteValue::Undefined,
    })
}

/// `target[key] = value`. Assignments to primitives are silently dropped.
pub fn set_property(
    target: &RemoteValue,
    key: String,
    value: RemoteValue,
) -> Result<(), RemoteError> {
    match target {
        RemoteValue::Undefined | RemoteValue::Null => {
            return Err(RemoteError::Type(format!(
                "Cannot set properties of {} (setting '{}')",
                target.to_display(),
                key
            )))
        }
        RemoteValue::Object(map) => {
            map.borrow_mut().insert(key, value);
        }
        RemoteValue::Function(f) => {
            f.properties.borrow_mut().insert(key, value);
        }
        RemoteValue::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = array_length(&value)?;
                items.resize(len, RemoteValue::Undefined);
            } else if let Some(i) = index(&key).filter(|i| *i < MAX_ARRAY_LENGTH) {
                // Anything at or past the largest index is a plain property, and arrays
                // carry none.
                if i >= items.len() {
                    items.resize(dense_length(i + 1)?, RemoteValue::Undefined);
                }
                items[i] = value;
            }
        }
        RemoteValue::Bool(_)
        | RemoteValue::Number(_)
        | RemoteValue::Str(_)
        | RemoteValue::Bytes(_) => {}
    }
    Ok(())
}
