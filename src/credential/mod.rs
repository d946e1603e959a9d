//! Credential cryptography.
//!
//! Two independent schemes live here:
//! - [`AccessCookieCipher`] seals and opens the broker's own access cookie,
//!   keyed by PBKDF2 from a configured password and salt.
//! - [`ExternalCredentialValidator`] checks a credential minted by an
//!   unrelated system with its own raw key and a date window.
//!
//! Both collapse every decode, decrypt and parse failure into
//! [`CredentialError::Invalid`] so callers cannot learn which check failed.

pub mod cipher;
pub mod external;

pub use cipher::{AccessCookie, AccessCookieCipher, CookieEnvelope};
pub use external::ExternalCredentialValidator;

use thiserror::Error;

/// Outcome of a failed credential operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// Tampered, stolen, expired or otherwise unusable credential
    #[error("invalid credentials")]
    Invalid,

    /// The cipher itself is mis-provisioned; a server fault, not a client one
    #[error("credential cipher is misconfigured")]
    Configuration,
}
