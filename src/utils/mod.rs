//! Shared utilities: the crate's error types and logging initialisation.

pub mod error;
pub mod logging;
