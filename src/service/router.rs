//! HTTP router and handlers

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use url::Url;

use super::AppState;
use super::pages;
use crate::credential::AccessCookie;
use crate::item::ItemError;
use crate::token::{ClientContext, ResponseShape, TokenFlow, TokenReply};

/// Raw query string pairs, in request order
type QueryPairs = Vec<(String, String)>;

/// Query parameters of a token request.
///
/// A repeated parameter keeps its first value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenParams {
    /// Correlation id chosen by the viewer
    pub message_id: Option<String>,
    /// Origin of the viewer page
    pub origin: Option<String>,
}

impl TokenParams {
    /// Pick the parameters out of raw query pairs
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            message_id: first_value(pairs, "messageId"),
            origin: first_value(pairs, "origin"),
        }
    }
}

/// Query parameters of a cookie request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CookieParams {
    /// Origin of the viewer page
    pub origin: Option<String>,
}

impl CookieParams {
    /// Pick the parameters out of raw query pairs
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            origin: first_value(pairs, "origin"),
        }
    }
}

fn first_value(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

/// Create the router.
///
/// Routes are a fixed table; each token route is bound to one
/// [`TokenFlow`] held by the state.
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = state.request_timeout;

    let routes = Router::new()
        .route("/status", get(status_handler))
        .route("/cookie", get(cookie_handler))
        .route("/token", get(token_handler))
        .route("/token/external", get(external_token_handler))
        .route("/access/{id}", get(access_mode_handler));

    with_middleware(routes, timeout).with_state(state)
}

fn with_middleware<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// GET /status - liveness probe
async fn status_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /cookie?origin=<uri> - mint an access cookie for the caller
async fn cookie_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let ip = client_ip(peer, &headers, state.trust_forwarded_for);
    let params = CookieParams::from_pairs(&pairs);

    let Some(origin) = params.origin.as_deref().and_then(|o| Url::parse(o.trim()).ok()) else {
        debug!(client = %ip, origin = ?params.origin, "Cookie request without a usable origin");
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page(
                "Bad request",
                "The origin parameter must be an absolute URL.",
            )),
        )
            .into_response();
    };

    let campus_network = state.classifier.is_privileged_ip(ip);
    let degraded_allowed = match state.store.degraded_allowed(origin.as_str()).await {
        Ok(allowed) => allowed,
        Err(e) => {
            error!(origin = %origin, error = %e, "Degraded access lookup failed");
            return unavailable_page();
        }
    };

    let access = AccessCookie::new(ip, campus_network, degraded_allowed);
    let sealed = match state.cipher.seal(&access) {
        Ok(sealed) => sealed,
        Err(e) => {
            error!(error = %e, "Failed to seal access cookie");
            return unavailable_page();
        }
    };

    info!(
        client = %ip,
        origin = %origin,
        campus_network,
        degraded_allowed,
        "Issued access cookie"
    );

    let jar = CookieJar::new().add(state.cookie.build(sealed));
    let page = pages::cookie_page(
        state.cipher.version(),
        origin.as_str(),
        &access,
        state.cookie.window_close_delay_secs,
    );

    (jar, Html(page)).into_response()
}

/// GET /token - exchange the access cookie for an access token
async fn token_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let params = TokenParams::from_pairs(&pairs);
    let client = client_context(peer, &headers, params, state.trust_forwarded_for);
    exchange(&state, &state.primary, &jar, &client)
}

/// GET /token/external - exchange an external credential for an access token
async fn external_token_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let params = TokenParams::from_pairs(&pairs);
    let client = client_context(peer, &headers, params, state.trust_forwarded_for);
    exchange(&state, &state.external, &jar, &client)
}

/// GET /access/{id} - access mode of one item
async fn access_mode_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let failure = match state.items.access_mode(&id).await {
        Ok(Some(mode)) => return Json(json!({ "accessMode": mode })).into_response(),
        Ok(None) => ItemError::NotFound,
        Err(e) => {
            error!(id = %id, error = %e, "Access mode lookup failed");
            ItemError::Unavailable
        }
    };

    (
        failure.status(),
        Json(json!({ "error": failure, "message": failure.message(&id) })),
    )
        .into_response()
}

fn exchange(state: &AppState, flow: &dyn TokenFlow, jar: &CookieJar, client: &ClientContext) -> Response {
    let today = Utc::now().date_naive();
    render(state.exchange.exchange(flow, jar, client, today))
}

fn render(reply: TokenReply) -> Response {
    match reply.shape {
        ResponseShape::Json => (reply.status, Json(reply.result)).into_response(),
        ResponseShape::Page { origin } => match pages::token_page(&reply.result, &origin) {
            Ok(html) => (reply.status, Html(html)).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to render token page");
                fault_response()
            }
        },
    }
}

fn client_context(
    peer: SocketAddr,
    headers: &HeaderMap,
    params: TokenParams,
    trust_forwarded_for: bool,
) -> ClientContext {
    ClientContext {
        ip: client_ip(peer, headers, trust_forwarded_for),
        origin: params.origin,
        message_id: params.message_id,
    }
}

/// Address of the client, in canonical form.
///
/// The first `X-Forwarded-For` hop is used only when the deployment sits
/// behind a trusted proxy; otherwise the TCP peer is authoritative.
pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trust_forwarded_for: bool) -> IpAddr {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .flatten();

    if trust_forwarded_for && forwarded.is_none() && headers.contains_key("x-forwarded-for") {
        warn!(peer = %peer, "Ignoring unparsable X-Forwarded-For header");
    }

    forwarded.unwrap_or_else(|| peer.ip()).to_canonical()
}

fn unavailable_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(pages::error_page(
            "Service unavailable",
            "The access cookie could not be issued.",
        )),
    )
        .into_response()
}

fn fault_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

// The panic payload never reaches the response body.
fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("Request handler panicked");
    fault_response()
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderValue, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn pairs(query: &[(&str, &str)]) -> QueryPairs {
        query
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_repeated_parameters_keep_first_value() {
        let params = TokenParams::from_pairs(&pairs(&[
            ("messageId", "1"),
            ("origin", "https://a.org"),
            ("messageId", "2"),
            ("origin", "https://b.org"),
        ]));
        assert_eq!(params.message_id.as_deref(), Some("1"));
        assert_eq!(params.origin.as_deref(), Some("https://a.org"));

        let params = CookieParams::from_pairs(&pairs(&[("other", "x"), ("origin", "https://a.org")]));
        assert_eq!(params.origin.as_deref(), Some("https://a.org"));
        assert_eq!(TokenParams::from_pairs(&[]), TokenParams::default());
    }

    async fn leaky_handler() -> &'static str {
        panic!("cookie.password=hunter2")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_opaque_fault() {
        let app = with_middleware(
            Router::new().route("/leak", get(leaky_handler)),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(Request::builder().uri("/leak").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({ "error": "Internal server error" })
        );
        assert!(!body.contains("hunter2"));
        assert!(!body.contains("cookie.password"));
    }

    fn peer() -> SocketAddr {
        "10.1.2.3:54321".parse().unwrap()
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_client_ip_defaults_to_peer() {
        let headers = forwarded("203.0.113.9");
        assert_eq!(client_ip(peer(), &headers, false), peer().ip());
    }

    #[test]
    fn test_client_ip_uses_first_forwarded_hop() {
        let headers = forwarded("203.0.113.9, 10.0.0.1");
        assert_eq!(
            client_ip(peer(), &headers, true),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );

        let garbage = forwarded("unknown");
        assert_eq!(client_ip(peer(), &garbage, true), peer().ip());
    }

    #[test]
    fn test_client_ip_is_canonical() {
        let mapped: SocketAddr = "[::ffff:127.0.0.1]:80".parse().unwrap();
        assert_eq!(
            client_ip(mapped, &HeaderMap::new(), false),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }
}
