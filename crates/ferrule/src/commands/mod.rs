//! CLI command implementations

pub mod convert;
pub mod explain;
pub mod init;
