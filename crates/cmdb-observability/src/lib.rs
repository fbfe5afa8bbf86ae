//! # cmdb-observability
//!
//! Logging and metrics setup for the CMDB.
//!
//! Structured logging goes through `tracing` with an `EnvFilter`; counters go
//! through the `metrics` facade and are rendered by a Prometheus recorder.

pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use self::metrics::{install_prometheus_recorder, register_metrics};

/// Errors raised while setting up logging or metrics.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
