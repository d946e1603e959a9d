//! Per-origin degraded-access settings.
//!
//! The cookie flow asks the store whether an origin may fall back to a
//! degraded (lower quality) rendition when the client is not authorised.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Store lookup failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("degraded access store unavailable: {0}")]
    Unavailable(String),
}

/// Source of per-origin degraded-access flags.
#[async_trait]
pub trait DegradedAccessStore: Send + Sync {
    /// Flag for `origin`; unknown origins are not allowed degraded access.
    async fn degraded_allowed(&self, origin: &str) -> Result<bool, StoreError>;
}

/// Process-local store seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryDegradedAccessStore {
    origins: DashMap<String, bool>,
}

impl InMemoryDegradedAccessStore {
    /// Create a store from an origin -> flag map
    #[must_use]
    pub fn new(origins: &HashMap<String, bool>) -> Self {
        let store = Self::default();
        for (origin, allowed) in origins {
            store.set(origin, *allowed);
        }
        store
    }

    /// Set or replace the flag for `origin`
    pub fn set(&self, origin: &str, allowed: bool) {
        self.origins.insert(origin_key(origin), allowed);
    }

    /// Number of configured origins
    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether no origin is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

#[async_trait]
impl DegradedAccessStore for InMemoryDegradedAccessStore {
    async fn degraded_allowed(&self, origin: &str) -> Result<bool, StoreError> {
        let allowed = self.origins.get(&origin_key(origin)).map(|entry| *entry.value());
        if allowed.is_none() {
            debug!(origin, "Origin has no degraded access setting");
        }
        Ok(allowed.unwrap_or(false))
    }
}

/// Key under which an origin's flag is stored and looked up.
///
/// URLs reduce to their ASCII origin: scheme and host lowercased, default
/// port and path dropped. Strings without a tuple origin are only trimmed.
#[must_use]
pub fn origin_key(origin: &str) -> String {
    let origin = origin.trim();
    match Url::parse(origin).map(|url| url.origin()) {
        Ok(tuple) if tuple.is_tuple() => tuple.ascii_serialization(),
        _ => origin.trim_end_matches('/').to_string(),
    }
}
