//! Session configuration.

use crate::error::ProxyError;
use jsproxy_command::MAX_CALLBACK_DEPTH;
use serde::Deserialize;
use std::time::Duration;

/// Tunables for a [`crate::Session`].
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```
/// use jsproxy::SessionConfig;
///
/// let cfg = SessionConfig::from_toml_str("depth = 2\nsegment_size = 4096").unwrap();
/// assert_eq!(cfg.depth, 2);
/// assert_eq!(cfg.segment_size, Some(4096));
/// assert_eq!(cfg.sync_timeout_ms, 3000);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Result-conversion depth sent with each batch.
    pub depth: u32,
    /// Default timeout for synchronous evaluation.
    pub sync_timeout_ms: u64,
    /// Longest single wait while pumping for a reply.
    pub poll_interval_ms: u64,
    /// Segment every outbound batch at this many characters.
    pub segment_size: Option<usize>,
    /// Log every inbound and outbound message at debug level.
    pub verbose: bool,
    /// Flush the command buffer after every `queue`.
    pub auto_flush: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            depth: 1,
            sync_timeout_ms: 3000,
            poll_interval_ms: 5,
            segment_size: None,
            verbose: false,
            auto_flush: false,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ProxyError> {
        let cfg: SessionConfig =
            toml::from_str(text).map_err(|e| ProxyError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.depth == 0 || self.depth > MAX_CALLBACK_DEPTH {
            return Err(ProxyError::Config(format!(
                "depth must be between 1 and {}, got {}",
                MAX_CALLBACK_DEPTH, self.depth
            )));
        }
        if self.segment_size == Some(0) {
            return Err(ProxyError::Config("segment_size must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ProxyError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
