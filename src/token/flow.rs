//! Credential flows that can back a token request.

use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;
use chrono::NaiveDate;
use tracing::debug;

use super::{AccessToken, AccessTokenError, CampusNetworkToken, ClientContext, ExternalAffiliateToken};
use crate::credential::{AccessCookieCipher, ExternalCredentialValidator};

/// One way of turning presented cookies into an access token.
pub trait TokenFlow: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Check the presented credential and build the token payload.
    ///
    /// Absent cookies are [`AccessTokenError::MissingCredentials`]; a
    /// present but unusable credential is never reported as missing.
    fn issue(
        &self,
        jar: &CookieJar,
        client: &ClientContext,
        today: NaiveDate,
    ) -> Result<AccessToken, AccessTokenError>;
}

/// Exchanges the broker's own access cookie.
#[derive(Debug, Clone)]
pub struct PrimaryFlow {
    cipher: Arc<AccessCookieCipher>,
    cookie_name: String,
}

impl PrimaryFlow {
    /// Create a flow reading the access cookie named `cookie_name`.
    pub fn new(cipher: Arc<AccessCookieCipher>, cookie_name: impl Into<String>) -> Self {
        Self {
            cipher,
            cookie_name: cookie_name.into(),
        }
    }
}

impl TokenFlow for PrimaryFlow {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn issue(
        &self,
        jar: &CookieJar,
        client: &ClientContext,
        _today: NaiveDate,
    ) -> Result<AccessToken, AccessTokenError> {
        let cookie = jar.get(&self.cookie_name).ok_or_else(|| {
            debug!(cookie = %self.cookie_name, "Access cookie not presented");
            AccessTokenError::MissingCredentials
        })?;

        let access = self.cipher.open(cookie.value(), client.ip)?;

        Ok(AccessToken::CampusNetwork(CampusNetworkToken {
            version: self.cipher.version().to_string(),
            campus_network: access.campus_network,
        }))
    }
}

/// Exchanges a credential minted by the external application.
#[derive(Debug, Clone)]
pub struct ExternalFlow {
    validator: Arc<ExternalCredentialValidator>,
    ciphertext_cookie: String,
    iv_cookie: String,
    version: String,
}

impl ExternalFlow {
    /// Create a flow reading the two external cookies by name.
    pub fn new(
        validator: Arc<ExternalCredentialValidator>,
        ciphertext_cookie: impl Into<String>,
        iv_cookie: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            ciphertext_cookie: ciphertext_cookie.into(),
            iv_cookie: iv_cookie.into(),
            version: version.into(),
        }
    }
}

impl TokenFlow for ExternalFlow {
    fn name(&self) -> &'static str {
        "external"
    }

    fn issue(
        &self,
        jar: &CookieJar,
        _client: &ClientContext,
        today: NaiveDate,
    ) -> Result<AccessToken, AccessTokenError> {
        let (Some(ciphertext), Some(iv)) = (jar.get(&self.ciphertext_cookie), jar.get(&self.iv_cookie))
        else {
            debug!(
                ciphertext_cookie = %self.ciphertext_cookie,
                iv_cookie = %self.iv_cookie,
                "External credential cookies not presented"
            );
            return Err(AccessTokenError::MissingCredentials);
        };

        self.validator.validate(ciphertext.value(), iv.value(), today)?;

        Ok(AccessToken::ExternalAffiliate(ExternalAffiliateToken {
            version: self.version.clone(),
            external_affiliate: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::LazyLock;

    use axum_extra::extract::cookie::Cookie;

    use super::*;
    use crate::credential::AccessCookie;
    use crate::credential::external::DEFAULT_DATE_FORMAT;

    static CIPHER: LazyLock<Arc<AccessCookieCipher>> =
        LazyLock::new(|| Arc::new(AccessCookieCipher::new("password", "salt", "1.0").unwrap()));

    const SECRET: &[u8] = b"ThisPasswordIsReallyHardToGuess!";
    const IV_HEX: &str = "30313233343536373839414243444546";
    const CIPHERTEXT_HEX: &str = "5AFF80488740353F8A11B99C7A493D871807521908500772B92E4F8FC919E305A607ADB714B22EF08D2C22FC08C8A6EC";

    fn client(ip: &str) -> ClientContext {
        ClientContext::machine(ip.parse().unwrap())
    }

    fn epoch() -> NaiveDate {
        NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()
    }

    fn external_flow() -> ExternalFlow {
        let validator =
            ExternalCredentialValidator::new(SECRET, "Authenticated", DEFAULT_DATE_FORMAT).unwrap();
        ExternalFlow::new(
            Arc::new(validator),
            "sinai_authenticated_3day",
            "initialization_vector",
            "1.0",
        )
    }

    fn sealed(ip: &str, campus: bool) -> String {
        let ip: IpAddr = ip.parse().unwrap();
        CIPHER.seal(&AccessCookie::new(ip, campus, false)).unwrap()
    }

    #[test]
    fn test_primary_flow_reports_campus_status() {
        let flow = PrimaryFlow::new(CIPHER.clone(), "iiif-access");

        for campus in [true, false] {
            let jar = CookieJar::new().add(Cookie::new("iiif-access", sealed("10.0.0.5", campus)));
            let token = flow.issue(&jar, &client("10.0.0.5"), epoch()).unwrap();
            assert_eq!(
                token,
                AccessToken::CampusNetwork(CampusNetworkToken {
                    version: "1.0".into(),
                    campus_network: campus,
                })
            );
        }
    }

    #[test]
    fn test_primary_flow_missing_cookie() {
        let flow = PrimaryFlow::new(CIPHER.clone(), "iiif-access");
        let jar = CookieJar::new().add(Cookie::new("other", "value"));

        assert_eq!(
            flow.issue(&jar, &client("10.0.0.5"), epoch()),
            Err(AccessTokenError::MissingCredentials)
        );
    }

    #[test]
    fn test_primary_flow_rejects_other_address() {
        let flow = PrimaryFlow::new(CIPHER.clone(), "iiif-access");
        let jar = CookieJar::new().add(Cookie::new("iiif-access", sealed("10.0.0.5", true)));

        assert_eq!(
            flow.issue(&jar, &client("10.0.0.6"), epoch()),
            Err(AccessTokenError::InvalidCredentials)
        );
    }

    #[test]
    fn test_primary_flow_rejects_garbage() {
        let flow = PrimaryFlow::new(CIPHER.clone(), "iiif-access");
        let jar = CookieJar::new().add(Cookie::new("iiif-access", "not-a-cookie"));

        assert_eq!(
            flow.issue(&jar, &client("10.0.0.5"), epoch()),
            Err(AccessTokenError::InvalidCredentials)
        );
    }

    #[test]
    fn test_external_flow_issues_affiliate_token() {
        let jar = CookieJar::new()
            .add(Cookie::new("sinai_authenticated_3day", CIPHERTEXT_HEX))
            .add(Cookie::new("initialization_vector", IV_HEX));

        let token = external_flow().issue(&jar, &client("8.8.8.8"), epoch()).unwrap();
        assert_eq!(
            token,
            AccessToken::ExternalAffiliate(ExternalAffiliateToken {
                version: "1.0".into(),
                external_affiliate: true,
            })
        );
    }

    #[test]
    fn test_external_flow_needs_both_cookies() {
        let flow = external_flow();

        let only_ciphertext =
            CookieJar::new().add(Cookie::new("sinai_authenticated_3day", CIPHERTEXT_HEX));
        assert_eq!(
            flow.issue(&only_ciphertext, &client("8.8.8.8"), epoch()),
            Err(AccessTokenError::MissingCredentials)
        );

        let only_iv = CookieJar::new().add(Cookie::new("initialization_vector", IV_HEX));
        assert_eq!(
            flow.issue(&only_iv, &client("8.8.8.8"), epoch()),
            Err(AccessTokenError::MissingCredentials)
        );
    }

    #[test]
    fn test_external_flow_expired_credential() {
        let jar = CookieJar::new()
            .add(Cookie::new("sinai_authenticated_3day", CIPHERTEXT_HEX))
            .add(Cookie::new("initialization_vector", IV_HEX));
        let later = NaiveDate::from_ymd_opt(1970, 1, 5).unwrap();

        assert_eq!(
            external_flow().issue(&jar, &client("8.8.8.8"), later),
            Err(AccessTokenError::InvalidCredentials)
        );
    }
}
