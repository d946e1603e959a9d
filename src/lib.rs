//! hauth library
//!
//! Authentication broker implementing the IIIF Auth 1.0 cookie and token
//! services for an image delivery service.
//!
//! # Components
//!
//! - **Network classification**: CIDR prefix trie deciding whether a client
//!   is on the campus network ([`network`])
//! - **Access cookie cipher**: PBKDF2-keyed AES-256-CBC envelope bound to the
//!   client address ([`credential::cipher`])
//! - **External credentials**: date-window validation of credentials minted
//!   by an unrelated application ([`credential::external`])
//! - **Token exchange**: turns a presented credential into an access token
//!   and shapes the reply for browser or machine clients ([`token`])
//! - **Item access modes**: per-item `OPEN` / `TIERED` / `ALL_OR_NOTHING`
//!   lookup for the image service ([`item`])
//! - **HTTP service**: axum routes, cookie minting and graceful shutdown
//!   ([`service`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod item;
pub mod network;
pub mod service;
pub mod store;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
    }

    Ok(())
}
