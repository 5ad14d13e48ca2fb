//! Host-side control of a remote JavaScript object graph.
//!
//! Calling code builds [`Proxy`] chains (or raw [`Command`] trees), and a
//! [`Session`] validates them, assigns correlation ids and hands them to a
//! [`Transport`]. Replies come back as `results` for one-shot handlers and
//! `callback_results` for recurring callbacks registered with
//! [`Session::callback`] or [`Session::callable`].
//!
//! # Example
//!
//! ```
//! use jsproxy::{HostValue, LoopbackTransport, Proxy, Session};
//! use std::time::Duration;
//!
//! let mut session = Session::new(LoopbackTransport::new());
//! let call = Proxy::window().method("parseInt", vec![HostValue::from("42")]).unwrap();
//! let value = session.evaluate(call, Duration::from_secs(1)).unwrap();
//! assert_eq!(value, serde_json::json!(42));
//! ```

pub mod callback;
pub mod cli;
pub mod codec;
pub mod config;
pub mod embed;
pub mod error;
pub mod lazy;
pub mod logging;
pub mod messages;
pub mod proxy;
pub mod remote;
pub mod segment;
pub mod session;
pub mod transport;

pub use callback::{
    event_handler, result_handler, Callable, CallbackError, CallbackEvent, CallbackResult,
    EventHandler, ResultHandler,
};
pub use codec::{decode, decode_bytes, encode, encode_bytes, encode_wire, HostValue};
pub use config::SessionConfig;
pub use embed::EmbedOptions;
pub use error::ProxyError;
pub use lazy::{LazyRef, FRAGILE_JS_REFERENCE, FRAGILE_THIS};
pub use messages::{Envelope, Inbound};
pub use proxy::Proxy;
pub use segment::{reassemble, split_for_send, Reassembler, Segment};
pub use session::{SendOutcome, Session};
pub use transport::{LoopbackTransport, MemoryTransport, Transport};

pub use jsproxy_command::{Command, CommandError, RootName};
