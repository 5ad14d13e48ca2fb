//! Lazy chaining through the fragile reference slot.
//!
//! Each lazy step stores its value in `element._FRAGILE_JS_REFERENCE` (and
//! the value it was read from in `element._FRAGILE_THIS`) so the next step
//! only has to name the slot, not resend the whole chain. The slot holds a
//! single value, so only the most recent [`LazyRef`] may be used; any older
//! one is stale and every operation on it fails.

use crate::codec::HostValue;
use crate::error::ProxyError;
use crate::session::{SendOutcome, Session};
use crate::transport::Transport;
use jsproxy_command::Command;
use serde_json::Value;
use std::time::Duration;

pub const FRAGILE_THIS: &str = "_FRAGILE_THIS";
pub const FRAGILE_JS_REFERENCE: &str = "_FRAGILE_JS_REFERENCE";

/// Handle on the value currently held in the fragile slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyRef {
    generation: u64,
    /// Key of the last property read, so a following call binds `this`.
    method: Option<String>,
    root: bool,
}

impl LazyRef {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn slot(name: &str) -> Command {
    Command::get(Command::element(), name)
}

impl<T: Transport> Session<T> {
    fn check_current(&self, lazy: &LazyRef) -> Result<(), ProxyError> {
        if lazy.generation != self.fragile_generation {
            return Err(ProxyError::StaleFragileJavascriptReference {
                generation: lazy.generation,
                current: self.fragile_generation,
            });
        }
        Ok(())
    }

    fn advance(
        &mut self,
        step: Command,
        method: Option<String>,
        root: bool,
    ) -> Result<LazyRef, ProxyError> {
        self.send_command(Command::discard(step), None)?;
        self.fragile_generation += 1;
        Ok(LazyRef {
            generation: self.fragile_generation,
            method,
            root,
        })
    }

    /// Starts a lazy chain at `start`, usually a root.
    pub fn lazy(&mut self, start: impl Into<Command>) -> Result<LazyRef, ProxyError> {
        let start = start.into();
        let root = matches!(start, Command::Root(_));
        let step = Command::set(Command::element(), FRAGILE_JS_REFERENCE, start);
        self.advance(step, None, root)
    }

    /// `slot = slot[key]`, remembering the old slot value as `this`.
    pub fn lazy_get(&mut self, lazy: &LazyRef, key: &str) -> Result<LazyRef, ProxyError> {
        self.check_current(lazy)?;
        let keep_this = Command::set(Command::element(), FRAGILE_THIS, slot(FRAGILE_JS_REFERENCE));
        let value = Command::get(slot(FRAGILE_THIS), key);
        let step = Command::set(keep_this, FRAGILE_JS_REFERENCE, value);
        self.advance(step, Some(key.to_string()), false)
    }

    /// `slot = this[key](...args)` after a property read, otherwise
    /// `slot = slot(...args)`.
    pub fn lazy_call(
        &mut self,
        lazy: &LazyRef,
        args: Vec<HostValue>,
    ) -> Result<LazyRef, ProxyError> {
        self.check_current(lazy)?;
        if lazy.root {
            return Err(ProxyError::RootNotCallable);
        }
        let args = match self.lower(HostValue::List(args))? {
            Command::List(items) => items,
            other => vec![other],
        };
        let value = match &lazy.method {
            Some(method) => Command::call(slot(FRAGILE_THIS), method.clone(), args),
            None => Command::apply(slot(FRAGILE_JS_REFERENCE), args),
        };
        let step = Command::set(Command::element(), FRAGILE_JS_REFERENCE, value);
        self.advance(step, None, false)
    }

    /// `slot[key] = value`. The slot keeps its value, so `lazy` stays
    /// current.
    pub fn lazy_set(
        &mut self,
        lazy: &LazyRef,
        key: &str,
        value: impl Into<HostValue>,
    ) -> Result<SendOutcome, ProxyError> {
        self.check_current(lazy)?;
        let value = self.lower(value)?;
        let step = Command::set(slot(FRAGILE_JS_REFERENCE), key, value);
        self.send_command(Command::discard(step), None)
    }

    /// A command reading the slot, for use in ordinary commands.
    pub fn lazy_command(&self, lazy: &LazyRef) -> Result<Command, ProxyError> {
        self.check_current(lazy)?;
        Ok(slot(FRAGILE_JS_REFERENCE))
    }

    /// Reads the slot synchronously.
    pub fn lazy_value(&mut self, lazy: &LazyRef, timeout: Duration) -> Result<Value, ProxyError> {
        let command = self.lazy_command(lazy)?;
        self.evaluate(command, timeout)
    }
}
