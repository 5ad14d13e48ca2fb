//! Tag definitions: one entry per wire tag, with its arity and validator.

use crate::error::{invalid, CommandError};
use crate::types::Command;
use crate::validate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Operand count accepted by a tag (the tag itself is not counted).
#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    /// Exactly `n` operands.
    Fixed(usize),
    /// Between `min` and `max` operands. `None` for max = unlimited.
    Range(usize, Option<usize>),
}

/// Validates the full command array (tag at index 0) and builds the node.
pub type ValidateFn = fn(&[Value]) -> Result<Command, CommandError>;

pub struct TagDefinition {
    pub name: &'static str,
    pub arity: Arity,
    pub validate_fn: ValidateFn,
}

/// Map of tag name -> definition.
pub type TagMap = HashMap<&'static str, Arc<TagDefinition>>;

/// Checks that a command array has the operand count its tag expects.
pub fn assert_arity(tag: &str, arity: &Arity, expr_len: usize) -> Result<(), CommandError> {
    let operands = expr_len.saturating_sub(1);
    match arity {
        Arity::Fixed(n) => {
            if operands != *n {
                return Err(invalid(format!(
                    "\"{}\" expects {} operands, got {}.",
                    tag, n, operands
                )));
            }
        }
        Arity::Range(min, max) => {
            if operands < *min {
                return Err(invalid(format!(
                    "\"{}\" expects at least {} operands, got {}.",
                    tag, min, operands
                )));
            }
            if let Some(max) = max {
                if operands > *max {
                    return Err(invalid(format!(
                        "\"{}\" expects at most {} operands, got {}.",
                        tag, max, operands
                    )));
                }
            }
        }
    }
    Ok(())
}

fn all_tags() -> Vec<TagDefinition> {
    vec![
        TagDefinition {
            name: "window",
            arity: Arity::Fixed(0),
            validate_fn: validate::root,
        },
        TagDefinition {
            name: "element",
            arity: Arity::Fixed(0),
            validate_fn: validate::root,
        },
        TagDefinition {
            name: "get",
            arity: Arity::Fixed(2),
            validate_fn: validate::get,
        },
        TagDefinition {
            name: "method",
            arity: Arity::Range(2, None),
            validate_fn: validate::method,
        },
        TagDefinition {
            name: "function",
            arity: Arity::Range(1, None),
            validate_fn: validate::function,
        },
        TagDefinition {
            name: "set",
            arity: Arity::Fixed(3),
            validate_fn: validate::set,
        },
        TagDefinition {
            name: "new",
            arity: Arity::Range(1, None),
            validate_fn: validate::new,
        },
        TagDefinition {
            name: "id",
            arity: Arity::Fixed(1),
            validate_fn: validate::id,
        },
        TagDefinition {
            name: "list",
            arity: Arity::Range(0, None),
            validate_fn: validate::list,
        },
        TagDefinition {
            name: "dict",
            arity: Arity::Fixed(1),
            validate_fn: validate::dict,
        },
        TagDefinition {
            name: "bytes",
            arity: Arity::Fixed(1),
            validate_fn: validate::bytes,
        },
        TagDefinition {
            name: "callback",
            arity: Arity::Range(3, Some(4)),
            validate_fn: validate::callback,
        },
        TagDefinition {
            name: "null",
            arity: Arity::Fixed(1),
            validate_fn: validate::discard,
        },
        TagDefinition {
            name: "load_css",
            arity: Arity::Fixed(2),
            validate_fn: validate::load_asset,
        },
        TagDefinition {
            name: "load_js",
            arity: Arity::Fixed(2),
            validate_fn: validate::load_asset,
        },
    ]
}

/// The shared tag map.
pub fn tag_map() -> &'static TagMap {
    static MAP: OnceLock<TagMap> = OnceLock::new();
    MAP.get_or_init(|| {
        all_tags()
            .into_iter()
            .map(|def| (def.name, Arc::new(def)))
            .collect()
    })
}
