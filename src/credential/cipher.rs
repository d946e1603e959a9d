//! Access cookie sealing.
//!
//! Wire form: `base64(JSON{version, secret: base64(ciphertext), nonce: base64(iv)})`
//! where the ciphertext is the AES-256-CBC/PKCS#7 encryption of the JSON
//! payload `{"client-ip-address", "campus-network", "degraded-allowed"}`.
//!
//! The key is derived with PBKDF2-HMAC-SHA256 (65 536 iterations) from a
//! configured password and salt. The payload carries no expiry; its lifetime
//! is bounded by the browser cookie that transports it.
//!
//! CBC provides no integrity tag. Tampering is detected only incidentally,
//! through padding and JSON parse failures or an IP mismatch.

use std::fmt;
use std::net::IpAddr;

use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CredentialError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// PBKDF2 iteration count for the cookie key
pub const PBKDF2_ITERATIONS: u32 = 65_536;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Initialization vector length in bytes (one AES block)
pub const NONCE_LEN: usize = 16;

/// Facts sealed into the access cookie at mint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccessCookie {
    /// Address of the client the cookie was minted for
    pub client_ip_address: String,
    /// Whether that client was on the privileged network
    pub campus_network: bool,
    /// Whether the requesting origin is entitled to degraded access
    pub degraded_allowed: bool,
}

impl AccessCookie {
    /// Build a payload for `ip`, stored in canonical form.
    #[must_use]
    pub fn new(ip: IpAddr, campus_network: bool, degraded_allowed: bool) -> Self {
        Self {
            client_ip_address: ip.to_canonical().to_string(),
            campus_network,
            degraded_allowed,
        }
    }
}

/// Versioned wrapper around the encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEnvelope {
    /// Service version that sealed the cookie
    pub version: String,
    /// Base64 ciphertext
    pub secret: String,
    /// Base64 initialization vector
    pub nonce: String,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; KEY_LEN]);

/// Seals and opens access cookies.
///
/// Immutable after construction; share it behind an `Arc`. Each seal draws
/// its IV from the thread-local CSPRNG, so concurrent calls need no locking.
pub struct AccessCookieCipher {
    key: DerivedKey,
    version: String,
}

impl fmt::Debug for AccessCookieCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCookieCipher")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl AccessCookieCipher {
    /// Derive the cookie key from `password` and `salt`.
    ///
    /// Empty key material is a provisioning fault and yields
    /// [`CredentialError::Configuration`].
    pub fn new(
        password: &str,
        salt: &str,
        version: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        if password.is_empty() || salt.is_empty() {
            error!("Access cookie key material is empty");
            return Err(CredentialError::Configuration);
        }

        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut key,
        );
        let derived = DerivedKey(key);
        key.zeroize();

        Ok(Self {
            key: derived,
            version: version.into(),
        })
    }

    /// Version string written into every envelope
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Encrypt `cookie` under a fresh IV and wrap it in an envelope.
    pub fn seal(&self, cookie: &AccessCookie) -> Result<String, CredentialError> {
        let plaintext = serde_json::to_vec(cookie).map_err(|e| misconfigured("payload", &e))?;
        let nonce: [u8; NONCE_LEN] = rand::random();

        let secret = Aes256CbcEnc::new_from_slices(&self.key.0, &nonce)
            .map_err(|e| misconfigured("encryptor", &e))?
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let envelope = CookieEnvelope {
            version: self.version.clone(),
            secret: STANDARD.encode(secret),
            nonce: STANDARD.encode(nonce),
        };
        let envelope = serde_json::to_vec(&envelope).map_err(|e| misconfigured("envelope", &e))?;

        Ok(STANDARD.encode(envelope))
    }

    /// Decrypt an envelope and check it was issued to `expected_ip`.
    ///
    /// Every failure except a broken decryptor is reported as
    /// [`CredentialError::Invalid`]; the cause is only logged.
    pub fn open(&self, value: &str, expected_ip: IpAddr) -> Result<AccessCookie, CredentialError> {
        let raw = STANDARD
            .decode(value.trim())
            .map_err(|e| rejected("envelope encoding", &e))?;
        let envelope: CookieEnvelope =
            serde_json::from_slice(&raw).map_err(|e| rejected("envelope json", &e))?;

        let secret = STANDARD
            .decode(&envelope.secret)
            .map_err(|e| rejected("secret encoding", &e))?;
        let nonce = STANDARD
            .decode(&envelope.nonce)
            .map_err(|e| rejected("nonce encoding", &e))?;
        if nonce.len() != NONCE_LEN {
            return Err(rejected("nonce length", &nonce.len()));
        }

        let plaintext = Aes256CbcDec::new_from_slices(&self.key.0, &nonce)
            .map_err(|e| misconfigured("decryptor", &e))?
            .decrypt_padded_vec_mut::<Pkcs7>(&secret)
            .map_err(|e| rejected("padding", &e))?;

        let cookie: AccessCookie =
            serde_json::from_slice(&plaintext).map_err(|e| rejected("payload json", &e))?;

        let presented_by = expected_ip.to_canonical().to_string();
        if cookie.client_ip_address != presented_by {
            warn!(
                presented_by = %presented_by,
                issued_to = %cookie.client_ip_address,
                "Access cookie presented from a different address"
            );
            return Err(CredentialError::Invalid);
        }

        Ok(cookie)
    }
}

fn rejected(stage: &str, cause: &dyn fmt::Display) -> CredentialError {
    debug!(stage, cause = %cause, "Rejected access cookie");
    CredentialError::Invalid
}

fn misconfigured(stage: &str, cause: &dyn fmt::Display) -> CredentialError {
    error!(stage, cause = %cause, "Access cookie cipher failure");
    CredentialError::Configuration
}
