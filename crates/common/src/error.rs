//! Shared error types

use thiserror::Error;

/// Errors shared across the workspace: construction-time configuration
/// problems and plain I/O failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using the shared Error.
pub type Result<T> = std::result::Result<T, Error>;
