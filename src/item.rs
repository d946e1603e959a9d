//! Per-item access modes.
//!
//! The image service asks which kind of access an item requires before it
//! decides whether to advertise the cookie and token services at all.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::StoreError;

/// How an item may be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    /// Anyone may see the full item
    Open,
    /// Unauthorised clients get a degraded rendition
    Tiered,
    /// Unauthorised clients get nothing
    AllOrNothing,
}

/// Named error codes of the access mode lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemError {
    /// No access mode is recorded for the item
    NotFound,
    /// The item store could not be queried
    Unavailable,
}

impl ItemError {
    /// HTTP status of the error response
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description returned alongside the code
    #[must_use]
    pub fn message(self, id: &str) -> String {
        match self {
            Self::NotFound => format!("No access mode is recorded for item {id}"),
            Self::Unavailable => "The item store is unavailable".to_string(),
        }
    }
}

/// Source of per-item access modes.
#[async_trait]
pub trait ItemAccessStore: Send + Sync {
    /// Access mode of `id`, `None` when the item is unknown
    async fn access_mode(&self, id: &str) -> Result<Option<AccessMode>, StoreError>;
}

/// Process-local item store seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryItemAccessStore {
    items: DashMap<String, AccessMode>,
}

impl InMemoryItemAccessStore {
    /// Create a store from an id -> mode map
    #[must_use]
    pub fn new(items: &HashMap<String, AccessMode>) -> Self {
        let store = Self::default();
        for (id, mode) in items {
            store.set(id, *mode);
        }
        store
    }

    /// Set or replace the mode of `id`
    pub fn set(&self, id: &str, mode: AccessMode) {
        self.items.insert(id.trim().to_string(), mode);
    }

    /// Number of known items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl ItemAccessStore for InMemoryItemAccessStore {
    async fn access_mode(&self, id: &str) -> Result<Option<AccessMode>, StoreError> {
        let mode = self.items.get(id.trim()).map(|entry| *entry.value());
        if mode.is_none() {
            debug!(id, "Item has no access mode");
        }
        Ok(mode)
    }
}
