//! HTML pages returned to browser clients.
//!
//! Pages are rendered with `format!`; every interpolated value is either
//! HTML-escaped or JSON-encoded with the characters that could close a
//! `<script>` element replaced by their `\uXXXX` escapes.

use std::fmt::Write;

use crate::credential::AccessCookie;
use crate::token::TokenResult;

/// Page delivering a token result to the embedding frame.
///
/// The result object is posted to `window.parent` with `origin` as the
/// target origin, as the IIIF Auth 1.0 token service requires.
pub fn token_page(result: &TokenResult, origin: &str) -> serde_json::Result<String> {
    let message = script_json(result)?;
    let target = script_json(&origin)?;

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Access token</title>
</head>
<body>
<script>
window.parent.postMessage({message}, {target});
</script>
</body>
</html>
"#
    ))
}

/// Page shown after an access cookie was set.
///
/// It lists the sealed facts and closes its own window after
/// `close_delay_secs`, which signals the viewer to request a token.
pub fn cookie_page(version: &str, origin: &str, cookie: &AccessCookie, close_delay_secs: u64) -> String {
    let delay_ms = close_delay_secs.saturating_mul(1000);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Access granted</title>
</head>
<body>
<h1>Access cookie issued</h1>
<dl>
<dt>Service version</dt><dd>{version}</dd>
<dt>Origin</dt><dd>{origin}</dd>
<dt>Client IP address</dt><dd>{ip}</dd>
<dt>Campus network</dt><dd>{campus}</dd>
<dt>Degraded access allowed</dt><dd>{degraded}</dd>
</dl>
<p>This window will close automatically.</p>
<script>
window.setTimeout(function () {{ window.close(); }}, {delay_ms});
</script>
</body>
</html>
"#,
        version = escape_html(version),
        origin = escape_html(origin),
        ip = escape_html(&cookie.client_ip_address),
        campus = cookie.campus_network,
        degraded = cookie.degraded_allowed,
    )
}

/// Minimal page for cookie requests that cannot be served.
pub fn error_page(title: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<h1>{title}</h1>
<p>{detail}</p>
</body>
</html>
"#,
        title = escape_html(title),
        detail = escape_html(detail),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// JSON never contains these outside of strings, so escaping them keeps the
// value identical for the script while making `</script>` impossible.
fn script_json<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                let _ = write!(escaped, "\\u{:04x}", u32::from(c));
            }
            _ => escaped.push(c),
        }
    }
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessTokenError, TokenFailure, TokenSuccess};

    #[test]
    fn test_token_page_posts_result_to_origin() {
        let result = TokenResult::Success(TokenSuccess {
            access_token: "abc".to_string(),
            expires_in: Some(3600),
            message_id: Some("1".to_string()),
        });

        let html = token_page(&result, "https://viewer.example.org").unwrap();
        assert!(html.contains(
            r#"window.parent.postMessage({"accessToken":"abc","expiresIn":3600,"messageId":"1"}, "https://viewer.example.org");"#
        ));
    }

    #[test]
    fn test_token_page_cannot_close_script() {
        let result = TokenResult::Failure(TokenFailure::new(
            AccessTokenError::InvalidCredentials,
            Some("</script><script>alert(1)</script>".to_string()),
        ));

        let html = token_page(&result, "https://a.org\u{2028}").unwrap();
        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.contains(r"\u003c/script\u003e"));
        assert!(html.contains(r#""https://a.org\u2028""#));
    }

    #[test]
    fn test_cookie_page_escapes_origin() {
        let cookie = AccessCookie::new("127.0.0.1".parse().unwrap(), true, false);
        let html = cookie_page("1.0", "https://a.org/?q=<b>", &cookie, 2);

        assert!(html.contains("https://a.org/?q=&lt;b&gt;"));
        assert!(html.contains("<dd>127.0.0.1</dd>"));
        assert!(html.contains("<dt>Campus network</dt><dd>true</dd>"));
        assert!(html.contains("<dt>Degraded access allowed</dt><dd>false</dd>"));
        assert!(html.contains("2000);"));
    }

    #[test]
    fn test_error_page() {
        let html = error_page("Bad request", "origin & more");
        assert!(html.contains("<title>Bad request</title>"));
        assert!(html.contains("origin &amp; more"));
    }
}
