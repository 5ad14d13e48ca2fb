//! Command tree for directing a remote JavaScript object graph.
//!
//! # Overview
//!
//! A remote operation is described by a [`Command`]: a tagged variant that
//! travels over the wire as a JSON array of the form `[tag, ...operands]`.
//! Commands nest, so `window.document.getElementById("x")` becomes
//!
//! ```text
//! ["method", ["get", ["window"], "document"], "getElementById", "x"]
//! ```
//!
//! Raw wire values are checked by [`validate_command`] before anything is
//! transmitted, and any command can be rendered as equivalent JavaScript
//! text with [`to_javascript`].
//!
//! # Example
//!
//! ```
//! use jsproxy_command::{validate_command, Command};
//! use serde_json::json;
//!
//! let cmd = validate_command(&json!(["get", ["window"], "location"]), true).unwrap();
//! assert_eq!(cmd.to_wire(), json!(["get", ["window"], "location"]));
//! assert!(matches!(cmd, Command::Get { .. }));
//! ```

pub mod error;
pub mod javascript;
pub mod tags;
pub mod types;
pub mod validate;
pub mod wire;

pub use error::CommandError;
pub use javascript::{indent_string, to_javascript};
pub use tags::{tag_map, Arity, TagDefinition, TagMap};
pub use types::{AssetKind, Command, RootName, MAX_CALLBACK_DEPTH};
pub use validate::{validate_command, validate_commands};
