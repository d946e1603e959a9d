//! Validation of credentials minted by an external application.
//!
//! The external system sets two hex cookies: an AES-CBC/PKCS#7 ciphertext
//! and the IV it was produced with. The key is the configured shared secret
//! used as-is (no key derivation). The plaintext reads `"<prefix> <date>"`;
//! the credential is valid while the current date is no later than three
//! days after the embedded one.

use std::fmt;

use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use aes::{Aes128, Aes192, Aes256};
use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::{debug, error};
use zeroize::Zeroizing;

use super::CredentialError;

/// Days an external credential stays valid after its embedded date
pub const VALIDITY_DAYS: u64 = 3;

/// Default chrono format of the embedded date (Ruby's `Time#to_s` in UTC)
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

const IV_LEN: usize = 16;

/// Checks external credentials against a shared secret and expected prefix.
pub struct ExternalCredentialValidator {
    secret: Zeroizing<Vec<u8>>,
    expected_prefix: String,
    date_format: String,
}

impl fmt::Debug for ExternalCredentialValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalCredentialValidator")
            .field("expected_prefix", &self.expected_prefix)
            .field("date_format", &self.date_format)
            .finish_non_exhaustive()
    }
}

impl ExternalCredentialValidator {
    /// Create a validator.
    ///
    /// The shared secret must be a valid AES key (16, 24 or 32 bytes);
    /// anything else is [`CredentialError::Configuration`].
    pub fn new(
        shared_secret: &[u8],
        expected_prefix: impl Into<String>,
        date_format: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        if !matches!(shared_secret.len(), 16 | 24 | 32) {
            error!(
                length = shared_secret.len(),
                "External credential secret is not a valid AES key length"
            );
            return Err(CredentialError::Configuration);
        }

        Ok(Self {
            secret: Zeroizing::new(shared_secret.to_vec()),
            expected_prefix: expected_prefix.into(),
            date_format: date_format.into(),
        })
    }

    /// Prefix a decrypted credential must carry
    #[must_use]
    pub fn expected_prefix(&self) -> &str {
        &self.expected_prefix
    }

    /// Validate a hex ciphertext / hex IV pair as of `today`.
    pub fn validate(
        &self,
        ciphertext_hex: &str,
        iv_hex: &str,
        today: NaiveDate,
    ) -> Result<(), CredentialError> {
        let ciphertext =
            hex::decode(ciphertext_hex.trim()).map_err(|e| rejected("ciphertext encoding", &e))?;
        let iv = hex::decode(iv_hex.trim()).map_err(|e| rejected("iv encoding", &e))?;
        if iv.len() != IV_LEN {
            return Err(rejected("iv length", &iv.len()));
        }

        let plaintext = self.decrypt(&ciphertext, &iv)?;
        let plaintext =
            String::from_utf8(plaintext).map_err(|e| rejected("plaintext encoding", &e))?;

        let (prefix, date_text) = plaintext
            .split_once(' ')
            .ok_or_else(|| rejected("plaintext layout", &"no separator"))?;
        if prefix != self.expected_prefix {
            return Err(rejected("prefix", &prefix));
        }

        let issued = self.parse_date(date_text)?;
        let deadline = issued
            .checked_add_days(Days::new(VALIDITY_DAYS))
            .ok_or_else(|| rejected("date range", &issued))?;

        if today > deadline {
            debug!(issued = %issued, today = %today, "External credential expired");
            return Err(CredentialError::Invalid);
        }

        Ok(())
    }

    fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let key = self.secret.as_slice();
        let decrypted = match key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|e| misconfigured(&e))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(|e| misconfigured(&e))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|e| misconfigured(&e))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            other => return Err(misconfigured(&format_args!("key length {other}"))),
        };

        decrypted.map_err(|e| rejected("padding", &e))
    }

    fn parse_date(&self, text: &str) -> Result<NaiveDate, CredentialError> {
        NaiveDateTime::parse_from_str(text, &self.date_format)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(text, &self.date_format))
            .map_err(|e| rejected("date", &e))
    }
}

fn rejected(stage: &str, cause: &dyn fmt::Display) -> CredentialError {
    debug!(stage, cause = %cause, "Rejected external credential");
    CredentialError::Invalid
}

fn misconfigured(cause: &dyn fmt::Display) -> CredentialError {
    error!(cause = %cause, "External credential decryptor failure");
    CredentialError::Configuration
}
