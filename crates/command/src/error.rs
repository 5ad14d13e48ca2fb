use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Malformed or unknown command shape.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A host value that has no wire representation.
    #[error("Untranslatable value of type {type_name}")]
    UntranslatableValue { type_name: String },
}

impl From<hex::FromHexError> for CommandError {
    fn from(e: hex::FromHexError) -> Self {
        CommandError::InvalidCommand(format!("Invalid hex payload: {}.", e))
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> CommandError {
    CommandError::InvalidCommand(msg.into())
}
