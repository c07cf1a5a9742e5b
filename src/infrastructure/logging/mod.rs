//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber. Console output
//! goes to stderr (JSON or pretty) so command output on stdout stays clean;
//! rolling log files are optional and always JSON.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
