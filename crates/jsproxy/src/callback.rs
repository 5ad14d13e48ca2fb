//! Host-side callback types.

use crate::error::ProxyError;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Error a host callback may return; it propagates out of message handling.
pub type CallbackError = Box<dyn std::error::Error>;

pub type CallbackResult = Result<(), CallbackError>;

/// One remote invocation of a registered callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    /// Correlation id the callback was registered under.
    pub id: u64,
    /// The untranslated data given at registration, echoed back.
    pub data: Value,
    /// The invocation arguments as a `{"0": ..., "1": ...}` mapping.
    pub arguments: Value,
    /// Per-callback invocation counter maintained by the remote side.
    pub counter: u64,
}

impl CallbackEvent {
    /// Positional argument `i`, if present.
    pub fn argument(&self, i: usize) -> Option<&Value> {
        self.arguments.get(i.to_string())
    }
}

/// Recurring handler for callback events.
pub type EventHandler = Rc<RefCell<dyn FnMut(&CallbackEvent) -> CallbackResult>>;

/// One-shot handler for the results of a command batch.
pub type ResultHandler = Box<dyn FnOnce(Result<Value, ProxyError>) -> CallbackResult>;

pub fn event_handler<F>(f: F) -> EventHandler
where
    F: FnMut(&CallbackEvent) -> CallbackResult + 'static,
{
    Rc::new(RefCell::new(f))
}

pub fn result_handler<F>(f: F) -> ResultHandler
where
    F: FnOnce(Result<Value, ProxyError>) -> CallbackResult + 'static,
{
    Box::new(f)
}

/// A host function that can be embedded in a value and registered lazily.
///
/// The `key` is the stable identity used by the session's callable cache:
/// wrapping two callables with the same key yields the same registration.
#[derive(Clone)]
pub struct Callable {
    key: String,
    handler: EventHandler,
}

impl Callable {
    pub fn new<F>(key: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&CallbackEvent) -> CallbackResult + 'static,
    {
        Callable {
            key: key.into(),
            handler: event_handler(f),
        }
    }

    pub fn from_handler(key: impl Into<String>, handler: EventHandler) -> Self {
        Callable {
            key: key.into(),
            handler,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handler(&self) -> EventHandler {
        Rc::clone(&self.handler)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("key", &self.key).finish()
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Rc::ptr_eq(&self.handler, &other.handler)
    }
}
