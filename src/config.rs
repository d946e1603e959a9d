//! Configuration management

use std::{collections::HashMap, env, net::SocketAddr, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::credential::external::DEFAULT_DATE_FORMAT;
use crate::item::AccessMode;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version string embedded in cookie envelopes and tokens
    pub version: String,
    /// Server configuration
    pub server: ServerConfig,
    /// Access cookie configuration
    pub cookie: CookieConfig,
    /// External credential configuration
    pub external: ExternalConfig,
    /// Privileged network definition
    pub campus_network: CampusNetworkConfig,
    /// Token response configuration
    pub token: TokenConfig,
    /// Per-origin degraded access seed
    pub degraded_access: DegradedAccessConfig,
    /// Per-item access mode seed
    pub items: ItemsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            cookie: CookieConfig::default(),
            external: ExternalConfig::default(),
            campus_network: CampusNetworkConfig::default(),
            token: TokenConfig::default(),
            degraded_access: DegradedAccessConfig::default(),
            items: ItemsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // HAUTH_COOKIE__PASSWORD -> cookie.password
        figment = figment.merge(Env::prefixed("HAUTH_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("server.port must not be 0"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::config("version must not be empty"));
        }

        for (name, value) in [
            ("cookie.password", &self.cookie.password),
            ("cookie.salt", &self.cookie.salt),
            ("cookie.name", &self.cookie.name),
            ("external.secret", &self.external.secret),
            ("external.valid_prefix", &self.external.valid_prefix),
            ("external.date_format", &self.external.date_format),
            ("external.ciphertext_cookie", &self.external.ciphertext_cookie),
            ("external.iv_cookie", &self.external.iv_cookie),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{name} is required")));
            }
        }

        if self.external.valid_prefix.contains(' ') {
            return Err(Error::config("external.valid_prefix must not contain spaces"));
        }

        Ok(())
    }
}

/// Resolve a setting that may be given as `env:VAR_NAME`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the referenced variable is unset or empty.
pub fn resolve_secret(name: &str, value: &str) -> Result<String> {
    let Some(var_name) = value.strip_prefix("env:") else {
        return Ok(value.to_string());
    };

    match env::var(var_name) {
        Ok(resolved) if !resolved.is_empty() => Ok(resolved),
        Ok(_) => Err(Error::config(format!(
            "{name}: environment variable {var_name} is empty"
        ))),
        Err(_) => Err(Error::config(format!(
            "{name}: environment variable {var_name} is not set"
        ))),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Take the client address from the first `X-Forwarded-For` hop
    pub trust_forwarded_for: bool,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            trust_forwarded_for: false,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host and port do not form an address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        let addr = if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        };
        addr.parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {addr}: {e}")))
    }

    /// Request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Access cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Key derivation password (supports `env:VAR_NAME`)
    pub password: String,
    /// Key derivation salt (supports `env:VAR_NAME`)
    pub salt: String,
    /// Cookie name
    pub name: String,
    /// `Max-Age` of the minted cookie; session cookie when unset
    pub max_age_secs: Option<u64>,
    /// Mark the cookie `Secure; SameSite=None`
    pub secure: bool,
    /// Seconds before the cookie page closes its window
    pub window_close_delay_secs: u64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            salt: String::new(),
            name: "iiif-access".to_string(),
            max_age_secs: None,
            secure: true,
            window_close_delay_secs: 1,
        }
    }
}

impl CookieConfig {
    /// Resolved password
    ///
    /// # Errors
    ///
    /// See [`resolve_secret`].
    pub fn resolve_password(&self) -> Result<String> {
        resolve_secret("cookie.password", &self.password)
    }

    /// Resolved salt
    ///
    /// # Errors
    ///
    /// See [`resolve_secret`].
    pub fn resolve_salt(&self) -> Result<String> {
        resolve_secret("cookie.salt", &self.salt)
    }
}

/// External credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Shared AES key (supports `env:VAR_NAME`)
    pub secret: String,
    /// First word of a valid plaintext
    pub valid_prefix: String,
    /// chrono format of the embedded date
    pub date_format: String,
    /// Cookie carrying the hex ciphertext
    pub ciphertext_cookie: String,
    /// Cookie carrying the hex IV
    pub iv_cookie: String,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            valid_prefix: "Authenticated".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            ciphertext_cookie: "sinai_authenticated_3day".to_string(),
            iv_cookie: "initialization_vector".to_string(),
        }
    }
}

impl ExternalConfig {
    /// Resolved shared secret
    ///
    /// # Errors
    ///
    /// See [`resolve_secret`].
    pub fn resolve_secret(&self) -> Result<String> {
        resolve_secret("external.secret", &self.secret)
    }
}

/// Privileged network configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CampusNetworkConfig {
    /// CIDR blocks, as a YAML list or one comma-separated string
    #[serde(deserialize_with = "subnet_list")]
    pub subnets: Vec<String>,
}

fn subnet_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Csv(String),
        List(Vec<String>),
    }

    let subnets = match Raw::deserialize(deserializer)? {
        Raw::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        Raw::List(list) => list,
    };

    Ok(subnets
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Token response configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Advisory `expiresIn` seconds
    pub expires_in: Option<u64>,
}

/// Degraded access seed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradedAccessConfig {
    /// Origin -> degraded access allowed
    pub origins: HashMap<String, bool>,
}

/// Item access mode seed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    /// Item id -> access mode
    pub access_modes: HashMap<String, AccessMode>,
}
