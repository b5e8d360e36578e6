use std::time::Duration;

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::{AppConfig, Env};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "token";

/// SessionTransport
///
/// Moves the session token between client and server in an `HttpOnly` cookie.
/// The cookie carries no `Domain` attribute, so browsers scope it to the API host.
///
/// Clearing the cookie only affects the browser's jar; a copy of the token
/// presented directly keeps verifying until it expires.
#[derive(Clone, Debug)]
pub struct SessionTransport {
    secure: bool,
    same_site: SameSite,
}

impl SessionTransport {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.env {
            // A credentialed cross-site SPA needs SameSite=None, which browsers only honour with Secure.
            Env::Production => Self {
                secure: true,
                same_site: SameSite::None,
            },
            Env::Local => Self {
                secure: false,
                same_site: SameSite::Lax,
            },
        }
    }

    /// Adds the session cookie with a lifetime of `ttl`.
    pub fn attach(&self, jar: CookieJar, token: String, ttl: Duration) -> CookieJar {
        let max_age = time::Duration::seconds(ttl.as_secs().try_into().unwrap_or(i64::MAX));
        jar.add(self.cookie(token, max_age))
    }

    /// Overwrites the session cookie with an empty, immediately expiring value.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(String::new(), time::Duration::ZERO))
    }

    fn cookie(&self, value: String, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(max_age)
            .build()
    }
}

/// Pulls the session token out of request headers.
///
/// The cookie wins; an `Authorization: Bearer` header is the fallback for
/// clients that hold the token from the login body. Empty values count as absent.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn local() -> SessionTransport {
        SessionTransport::from_config(&AppConfig::default())
    }

    #[test]
    fn attach_sets_http_only_cookie_with_ttl() {
        let jar = local().attach(CookieJar::new(), "abc".into(), Duration::from_secs(3600));
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(1)));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), None);
    }

    #[test]
    fn clear_expires_immediately() {
        let jar = local().clear(CookieJar::new());
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn production_cookies_are_cross_site_capable() {
        let config = AppConfig {
            env: Env::Production,
            ..AppConfig::default()
        };
        let jar = SessionTransport::from_config(&config).attach(
            CookieJar::new(),
            "abc".into(),
            Duration::from_secs(60),
        );
        let cookie = jar.get(SESSION_COOKIE).unwrap();

        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }

    #[test]
    fn extract_prefers_cookie_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("other=1; token=from-cookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn extract_falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn cleared_or_missing_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("token="));
        assert_eq!(extract_token(&headers), None);
    }
}
