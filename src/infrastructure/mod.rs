//! Infrastructure layer module
//!
//! Process-wide concerns shared by the binary and the library:
//! - Configuration management (figment, YAML, environment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
