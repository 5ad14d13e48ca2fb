use jsproxy_command::CommandError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed command or untranslatable value, caught before transmission.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("top level object cannot be called; dereference it first")]
    RootNotCallable,

    #[error("stale fragile javascript reference: generation {generation}, current {current}")]
    StaleFragileJavascriptReference { generation: u64, current: u64 },

    /// The remote side threw while executing a command.
    #[error("remote execution failed: {0}")]
    RemoteExecution(String),

    #[error("timeout waiting for command results: {elapsed:?} elapsed, timeout {timeout:?}")]
    SyncTimeout { elapsed: Duration, timeout: Duration },

    #[error("callback depth must be between 1 and 5, got {0}")]
    InvalidDepth(u32),

    #[error("segment size must be a positive integer")]
    InvalidSegmentSize,

    /// A host callback failed while handling message `id`.
    #[error("callback {id} failed: {message}")]
    Callback { id: u64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound message with a malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl ProxyError {
    /// True for errors that describe a programming mistake in command
    /// construction and must not be retried.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ProxyError::Command(_)
                | ProxyError::RootNotCallable
                | ProxyError::StaleFragileJavascriptReference { .. }
                | ProxyError::InvalidDepth(_)
                | ProxyError::InvalidSegmentSize
        )
    }
}
