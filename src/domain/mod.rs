//! Domain layer for the approval workflow engine
//!
//! This module contains core models, errors, and the ports adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ErrorKind};
