//! Unified error type for the nanokicker-lib crate.
//!
//! [`KickerError`] wraps link errors and the host-side error kinds (`Config`,
//! `InvalidInput`). `From` impls allow `?` to propagate across module
//! boundaries.

use std::fmt;

use crate::link::LinkError;

#[derive(Debug)]
pub enum KickerError {
    /// Motherboard link error (connect, not connected, lost, bad device id).
    Link(LinkError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// A value rejected before anything was sent.
    InvalidInput(String),
}

impl fmt::Display for KickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KickerError::Link(e) => write!(f, "{e}"),
            KickerError::Io(e) => write!(f, "I/O error: {e}"),
            KickerError::Config(e) => write!(f, "Config error: {e}"),
            KickerError::InvalidInput(e) => write!(f, "Invalid input: {e}"),
        }
    }
}

impl std::error::Error for KickerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KickerError::Link(e) => Some(e),
            KickerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for KickerError {
    fn from(e: LinkError) -> Self {
        KickerError::Link(e)
    }
}

impl From<std::io::Error> for KickerError {
    fn from(e: std::io::Error) -> Self {
        KickerError::Io(e)
    }
}

/// Crate-level Result alias using [`KickerError`].
pub type Result<T> = std::result::Result<T, KickerError>;
