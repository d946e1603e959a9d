//! Access token exchange.
//!
//! A token request presents a credential (the broker's own access cookie,
//! or an external credential pair) and receives an access token for the
//! image service. The token is base64 JSON: encoded, not encrypted.
//!
//! Failures use the IIIF Auth 1.0 error vocabulary, serialised by name.

mod exchange;
mod flow;

pub use exchange::{ResponseShape, TokenExchange, TokenFailure, TokenReply, TokenResult, TokenSuccess};
pub use flow::{ExternalFlow, PrimaryFlow, TokenFlow};

use std::net::IpAddr;

use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialError;

/// Named access token error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessTokenError {
    /// The required credential cookie(s) were not sent
    MissingCredentials,
    /// The credential failed validation
    InvalidCredentials,
    /// The service cannot issue tokens right now
    Unavailable,
}

impl AccessTokenError {
    /// HTTP status used when answering a machine client
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed description returned alongside the code
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingCredentials => "The credentials required for this request were not provided",
            Self::InvalidCredentials => "The credentials provided are not valid",
            Self::Unavailable => "The authorization service is unavailable",
        }
    }
}

impl From<CredentialError> for AccessTokenError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Invalid => Self::InvalidCredentials,
            CredentialError::Configuration => Self::Unavailable,
        }
    }
}

/// Token for a client whose access cookie was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampusNetworkToken {
    /// Service version
    pub version: String,
    /// Whether the cookie was minted on the privileged network
    pub campus_network: bool,
}

/// Token for a client holding a valid external credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAffiliateToken {
    /// Service version
    pub version: String,
    /// Always `true` once issued
    #[serde(rename = "sinaiAffiliate")]
    pub external_affiliate: bool,
}

/// An access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessToken {
    /// Issued by the primary flow
    CampusNetwork(CampusNetworkToken),
    /// Issued by the external flow
    ExternalAffiliate(ExternalAffiliateToken),
}

impl AccessToken {
    /// Base64 of the JSON payload
    pub fn encode(&self) -> Result<String, AccessTokenError> {
        let json = serde_json::to_vec(self).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize access token");
            AccessTokenError::Unavailable
        })?;
        Ok(STANDARD.encode(json))
    }

    /// Inverse of [`AccessToken::encode`]
    #[must_use]
    pub fn decode(token: &str) -> Option<Self> {
        let json = STANDARD.decode(token).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Facts observed about the client making the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Client address as seen by the broker
    pub ip: IpAddr,
    /// `origin` request parameter
    pub origin: Option<String>,
    /// `messageId` request parameter
    pub message_id: Option<String>,
}

impl ClientContext {
    /// Context for a request without browser parameters
    #[must_use]
    pub fn machine(ip: IpAddr) -> Self {
        Self {
            ip,
            origin: None,
            message_id: None,
        }
    }

    /// `(origin, message_id)` when both parameters are present.
    ///
    /// Only then is the request a browser client; the distinction shapes
    /// the response and never the authorization outcome.
    #[must_use]
    pub fn browser(&self) -> Option<(&str, &str)> {
        match (&self.origin, &self.message_id) {
            (Some(origin), Some(message_id)) => Some((origin.as_str(), message_id.as_str())),
            _ => None,
        }
    }

    /// Whether the response must be a page
    #[must_use]
    pub fn is_browser_client(&self) -> bool {
        self.browser().is_some()
    }
}
