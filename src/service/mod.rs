//! HTTP surface of the broker.
//!
//! Every component is built once from configuration and handed to the
//! handlers through [`AppState`]; nothing is looked up at request time.

mod pages;
mod router;
mod server;

pub use router::{CookieParams, TokenParams, client_ip, create_router};
pub use server::Broker;

use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use tracing::info;

use crate::config::{Config, CookieConfig};
use crate::credential::{AccessCookieCipher, CredentialError, ExternalCredentialValidator};
use crate::item::{InMemoryItemAccessStore, ItemAccessStore};
use crate::network::NetworkClassifier;
use crate::store::{DegradedAccessStore, InMemoryDegradedAccessStore};
use crate::token::{ExternalFlow, PrimaryFlow, TokenExchange};
use crate::{Error, Result};

/// Attributes of the access cookie set by `/cookie`.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Cookie name
    pub name: String,
    /// `Max-Age`; session cookie when unset
    pub max_age_secs: Option<u64>,
    /// Add `Secure; SameSite=None`
    pub secure: bool,
    /// Seconds before the cookie page closes its window
    pub window_close_delay_secs: u64,
}

impl From<&CookieConfig> for CookieSettings {
    fn from(config: &CookieConfig) -> Self {
        Self {
            name: config.name.clone(),
            max_age_secs: config.max_age_secs,
            secure: config.secure,
            window_close_delay_secs: config.window_close_delay_secs,
        }
    }
}

impl CookieSettings {
    /// Browser cookie carrying a sealed access cookie
    pub fn build(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true);

        if self.secure {
            cookie = cookie.secure(true).same_site(SameSite::None);
        }
        if let Some(max_age) = self.max_age_secs {
            let seconds = i64::try_from(max_age).unwrap_or(i64::MAX);
            cookie = cookie.max_age(time::Duration::seconds(seconds));
        }

        cookie.build()
    }
}

/// Shared, immutable request state
pub struct AppState {
    /// Privileged network classifier
    pub classifier: Arc<NetworkClassifier>,
    /// Access cookie cipher
    pub cipher: Arc<AccessCookieCipher>,
    /// Per-origin degraded access flags
    pub store: Arc<dyn DegradedAccessStore>,
    /// Per-item access modes
    pub items: Arc<dyn ItemAccessStore>,
    /// Flow behind `/token`
    pub primary: PrimaryFlow,
    /// Flow behind `/token/external`
    pub external: ExternalFlow,
    /// Response shaping for both token routes
    pub exchange: TokenExchange,
    /// Access cookie attributes
    pub cookie: CookieSettings,
    /// Take the client address from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl AppState {
    /// Build every component from configuration.
    ///
    /// This derives the cookie key and compiles the subnets, so it is the
    /// point where bad key material or malformed CIDR blocks stop startup.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DegradedAccessStore>,
        items: Arc<dyn ItemAccessStore>,
    ) -> Result<Self> {
        let password = config.cookie.resolve_password()?;
        let salt = config.cookie.resolve_salt()?;
        let cipher = AccessCookieCipher::new(&password, &salt, config.version.clone())
            .map_err(|e| startup_error("cookie", e))?;
        let cipher = Arc::new(cipher);

        let secret = config.external.resolve_secret()?;
        let validator = ExternalCredentialValidator::new(
            secret.as_bytes(),
            config.external.valid_prefix.clone(),
            config.external.date_format.clone(),
        )
        .map_err(|e| startup_error("external", e))?;

        let classifier = NetworkClassifier::load(&config.campus_network.subnets)?;
        info!(
            subnets = classifier.blocks().len(),
            "Loaded campus network subnets"
        );

        Ok(Self {
            classifier: Arc::new(classifier),
            primary: PrimaryFlow::new(Arc::clone(&cipher), config.cookie.name.clone()),
            external: ExternalFlow::new(
                Arc::new(validator),
                config.external.ciphertext_cookie.clone(),
                config.external.iv_cookie.clone(),
                config.version.clone(),
            ),
            cipher,
            store,
            items,
            exchange: TokenExchange::new(config.token.expires_in),
            cookie: CookieSettings::from(&config.cookie),
            trust_forwarded_for: config.server.trust_forwarded_for,
            request_timeout: config.server.request_timeout(),
        })
    }

    /// Build state backed by in-memory stores seeded from configuration
    pub fn with_seeded_store(config: &Config) -> Result<Self> {
        let store = InMemoryDegradedAccessStore::new(&config.degraded_access.origins);
        let items = InMemoryItemAccessStore::new(&config.items.access_modes);
        Self::from_config(config, Arc::new(store), Arc::new(items))
    }
}

fn startup_error(section: &str, e: CredentialError) -> Error {
    Error::config(format!("{section}: {e}"))
}
