//! Telemetry for the engine: structured logging through `tracing`.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
