//! Response shaping for token requests.

use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AccessTokenError, ClientContext, TokenFlow};

/// Body of a successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSuccess {
    /// Base64 token for the image service
    pub access_token: String,
    /// Advisory lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Correlation id echoed to browser clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Body of a failed token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFailure {
    /// Named error code
    pub error: AccessTokenError,
    /// Fixed description of the code
    pub message: String,
    /// Correlation id echoed to browser clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl TokenFailure {
    /// Failure body for `error`
    #[must_use]
    pub fn new(error: AccessTokenError, message_id: Option<String>) -> Self {
        Self {
            error,
            message: error.message().to_string(),
            message_id,
        }
    }
}

/// Either body; serialised without a wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenResult {
    /// A token was issued
    Success(TokenSuccess),
    /// The exchange was refused
    Failure(TokenFailure),
}

impl TokenResult {
    /// Error code, when the exchange failed
    #[must_use]
    pub fn error(&self) -> Option<AccessTokenError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure.error),
        }
    }
}

/// How the result must be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// Plain JSON with a status that reflects the outcome
    Json,
    /// HTML page posting the result to `origin`; always 200
    Page {
        /// Target origin for `postMessage`
        origin: String,
    },
}

/// A shaped token response, ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReply {
    /// HTTP status
    pub status: StatusCode,
    /// Result object
    pub result: TokenResult,
    /// Delivery format
    pub shape: ResponseShape,
}

/// Runs a [`TokenFlow`] and shapes its outcome for the requesting client.
#[derive(Debug, Clone, Default)]
pub struct TokenExchange {
    expires_in: Option<u64>,
}

impl TokenExchange {
    /// `expires_in` is advertised in successful responses when set
    #[must_use]
    pub fn new(expires_in: Option<u64>) -> Self {
        Self { expires_in }
    }

    /// Run `flow` for `client` and shape the outcome.
    ///
    /// Browser clients always get a 200 page; machine clients get JSON with
    /// the status of the error code.
    pub fn exchange(
        &self,
        flow: &dyn TokenFlow,
        jar: &CookieJar,
        client: &ClientContext,
        today: NaiveDate,
    ) -> TokenReply {
        let browser = client.browser();
        let message_id = browser.map(|(_, id)| id.to_string());

        let outcome = flow.issue(jar, client, today).and_then(|token| token.encode());
        let result = match outcome {
            Ok(access_token) => {
                info!(flow = flow.name(), client = %client.ip, "Issued access token");
                TokenResult::Success(TokenSuccess {
                    access_token,
                    expires_in: self.expires_in,
                    message_id,
                })
            }
            Err(error) => {
                match error {
                    AccessTokenError::MissingCredentials => {
                        debug!(flow = flow.name(), client = %client.ip, "Token request without credentials");
                    }
                    AccessTokenError::InvalidCredentials | AccessTokenError::Unavailable => {
                        warn!(flow = flow.name(), client = %client.ip, error = ?error, "Token request refused");
                    }
                }
                TokenResult::Failure(TokenFailure::new(error, message_id))
            }
        };

        match browser {
            Some((origin, _)) => TokenReply {
                status: StatusCode::OK,
                result,
                shape: ResponseShape::Page {
                    origin: origin.to_string(),
                },
            },
            None => TokenReply {
                status: result.error().map_or(StatusCode::OK, AccessTokenError::status),
                result,
                shape: ResponseShape::Json,
            },
        }
    }
}
