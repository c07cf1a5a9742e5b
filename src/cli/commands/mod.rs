//! CLI command implementations.

pub mod init;
pub mod sweep;
pub mod template;
