//! Tracing setup.

use crate::error::ProxyError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs a global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. `level` defaults to `"info"` and
/// accepts module directives such as `"jsproxy=debug,info"`.
pub fn init_tracing(level: Option<&str>, json_output: bool) -> Result<(), ProxyError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .map_err(|e| ProxyError::Logging(e.to_string()))?;

    let subscriber = Registry::default().with(env_filter);

    let result = if json_output {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(subscriber.with(json_layer))
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(subscriber.with(fmt_layer))
    };
    result.map_err(|e| ProxyError::Logging(e.to_string()))
}
