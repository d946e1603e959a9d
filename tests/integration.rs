//! Integration tests for the hauth core components
//!
//! These exercise the cipher, classifier, external validator and token
//! exchange together, without the HTTP layer.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use hauth::credential::external::DEFAULT_DATE_FORMAT;
use hauth::credential::{AccessCookie, AccessCookieCipher, CredentialError, ExternalCredentialValidator};
use hauth::network::NetworkClassifier;
use hauth::token::{
    AccessToken, AccessTokenError, CampusNetworkToken, ClientContext, ExternalFlow, PrimaryFlow,
    ResponseShape, TokenExchange, TokenResult,
};

const IV_HEX: &str = "30313233343536373839414243444546";
const CIPHERTEXT_HEX: &str = "5AFF80488740353F8A11B99C7A493D871807521908500772B92E4F8FC919E305A607ADB714B22EF08D2C22FC08C8A6EC";

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[test]
fn test_mint_then_exchange_scenario() {
    let classifier = NetworkClassifier::load(["192.168.0.0/24", "127.0.0.0/16"]).unwrap();
    let cipher = Arc::new(AccessCookieCipher::new("password", "salt", "1.0").unwrap());

    // Mint
    let client = ip("127.0.0.1");
    let campus = classifier.is_privileged_ip(client);
    assert!(campus);
    let sealed = cipher.seal(&AccessCookie::new(client, campus, false)).unwrap();

    // Exchange
    let flow = PrimaryFlow::new(Arc::clone(&cipher), "iiif-access");
    let jar = CookieJar::new().add(Cookie::new("iiif-access", sealed));
    let reply = TokenExchange::default().exchange(
        &flow,
        &jar,
        &ClientContext::machine(client),
        date("2024-01-01"),
    );

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.shape, ResponseShape::Json);
    let TokenResult::Success(success) = reply.result else {
        panic!("expected a token, got {:?}", reply.result);
    };
    assert_eq!(success.expires_in, None);
    assert_eq!(
        AccessToken::decode(&success.access_token),
        Some(AccessToken::CampusNetwork(CampusNetworkToken {
            version: "1.0".to_string(),
            campus_network: true,
        }))
    );
}

#[test]
fn test_cookie_round_trip_and_binding() {
    let cipher = AccessCookieCipher::new("password", "salt", "1.0").unwrap();

    for client in ["127.0.0.1", "192.168.0.200", "2001:db8::7"] {
        for campus in [true, false] {
            for degraded in [true, false] {
                let cookie = AccessCookie::new(ip(client), campus, degraded);
                let sealed = cipher.seal(&cookie).unwrap();

                assert_eq!(cipher.open(&sealed, ip(client)), Ok(cookie));
                assert_eq!(
                    cipher.open(&sealed, ip("10.10.10.10")),
                    Err(CredentialError::Invalid)
                );
            }
        }
    }
}

#[test]
fn test_network_classification() {
    let classifier = NetworkClassifier::load(["192.168.0.0/24", "127.0.0.0/16"]).unwrap();

    assert!(classifier.is_privileged_ip(ip("192.168.0.1")));
    assert!(classifier.is_privileged_ip(ip("127.0.1.1")));
    assert!(!classifier.is_privileged_ip(ip("192.168.1.1")));
    assert!(!classifier.is_privileged_ip(ip("127.1.1.1")));
}

#[test]
fn test_external_credential_window() {
    let validator = ExternalCredentialValidator::new(
        b"ThisPasswordIsReallyHardToGuess!",
        "Authenticated",
        DEFAULT_DATE_FORMAT,
    )
    .unwrap();

    assert_eq!(validator.validate(CIPHERTEXT_HEX, IV_HEX, date("1970-01-04")), Ok(()));
    assert_eq!(
        validator.validate(CIPHERTEXT_HEX, IV_HEX, date("1970-01-05")),
        Err(CredentialError::Invalid)
    );

    let other_prefix = ExternalCredentialValidator::new(
        b"ThisPasswordIsReallyHardToGuess!",
        "Anonymous",
        DEFAULT_DATE_FORMAT,
    )
    .unwrap();
    assert_eq!(
        other_prefix.validate(CIPHERTEXT_HEX, IV_HEX, date("1970-01-01")),
        Err(CredentialError::Invalid)
    );
}

#[test]
fn test_external_exchange_for_browser_client() {
    let validator = ExternalCredentialValidator::new(
        b"ThisPasswordIsReallyHardToGuess!",
        "Authenticated",
        DEFAULT_DATE_FORMAT,
    )
    .unwrap();
    let flow = ExternalFlow::new(
        Arc::new(validator),
        "sinai_authenticated_3day",
        "initialization_vector",
        "1.0",
    );
    let jar = CookieJar::new()
        .add(Cookie::new("sinai_authenticated_3day", CIPHERTEXT_HEX))
        .add(Cookie::new("initialization_vector", IV_HEX));
    let client = ClientContext {
        ip: ip("203.0.113.1"),
        origin: Some("https://viewer.example.org".to_string()),
        message_id: Some("abc".to_string()),
    };
    let exchange = TokenExchange::new(Some(600));

    let granted = exchange.exchange(&flow, &jar, &client, date("1970-01-03"));
    assert_eq!(granted.status, StatusCode::OK);
    assert!(matches!(granted.shape, ResponseShape::Page { .. }));
    assert_eq!(granted.result.error(), None);

    let expired = exchange.exchange(&flow, &jar, &client, date("1970-01-05"));
    assert_eq!(expired.status, StatusCode::OK);
    assert_eq!(expired.result.error(), Some(AccessTokenError::InvalidCredentials));
}
