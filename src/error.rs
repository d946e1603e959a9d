//! Error types for the hauth service

use std::io;

use thiserror::Error;

/// Result type alias for hauth startup and bootstrap
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the service from starting or serving.
///
/// Per-request credential failures never use this type; see
/// [`crate::credential::CredentialError`] and [`crate::token::AccessTokenError`].
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
