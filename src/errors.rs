//! Error handling for the threading system.
//!
//! The only recoverable failures in this crate are at thread creation;
//! everything else that can go wrong is a programming error and panics.
//! This module provides the error types for the recoverable surface.

use core::fmt;

/// Result type for thread creation.
pub type SpawnResult<T> = Result<T, SpawnError>;

/// Errors that can occur during thread spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No kernel has been booted in this process
    NotBooted,
    /// Out of memory for stack allocation
    OutOfMemory,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotBooted => write!(f, "no kernel is running"),
            SpawnError::OutOfMemory => write!(f, "out of memory for thread creation"),
        }
    }
}
