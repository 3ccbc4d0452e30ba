//! Observability for the resilience layer.
//!
//! Every component logs through `tracing`; this module sets up a subscriber
//! and keeps user data in rate limit and circuit keys out of log output.

mod logging;

pub use logging::{redact_key, LogFormat, LogLevel, LoggingConfig};
