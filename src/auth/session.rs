//! Carries tokens between client and server.
//!
//! Tokens go out as two `HttpOnly` cookies and come back in the
//! `Authorization` header as `<scheme> <token>`.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use super::errors::AuthError;
use super::jwt::{JwtKeys, TokenPair};
use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct SessionTransport {
    /// Used when issuing.
    scheme: String,
    accepted: Vec<String>,
    access_cookie: String,
    refresh_cookie: String,
    secure: bool,
    access_max_age: u64,
    refresh_max_age: u64,
}

impl SessionTransport {
    pub fn new(config: &AppConfig, keys: &JwtKeys) -> Self {
        Self {
            scheme: config
                .jwt
                .header_schemes
                .first()
                .cloned()
                .unwrap_or_else(|| "Bearer".into()),
            accepted: config.jwt.header_schemes.clone(),
            access_cookie: config.cookies.access_name.clone(),
            refresh_cookie: config.cookies.refresh_name.clone(),
            secure: config.cookies.secure,
            access_max_age: keys.access_ttl.as_secs(),
            refresh_max_age: keys.refresh_ttl.as_secs(),
        }
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> anyhow::Result<HeaderValue> {
        let mut cookie =
            format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Appends the access and refresh `Set-Cookie` headers.
    pub fn attach(&self, pair: &TokenPair, headers: &mut HeaderMap) -> anyhow::Result<()> {
        // The value holds a space, so it is quoted like any other cookie value would be.
        let access_value = format!("\"{} {}\"", self.scheme, pair.access_token);
        headers.append(
            SET_COOKIE,
            self.cookie(&self.access_cookie, &access_value, self.access_max_age)?,
        );
        headers.append(
            SET_COOKIE,
            self.cookie(&self.refresh_cookie, &pair.refresh_token, self.refresh_max_age)?,
        );
        Ok(())
    }

    /// Token from the `Authorization` header.
    ///
    /// No header, or a header for an unlisted scheme, is `Ok(None)`: the caller
    /// is anonymous. A listed scheme with a missing token or extra parts is an
    /// error.
    pub fn extract<'a>(&self, headers: &'a HeaderMap) -> Result<Option<&'a str>, AuthError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
        let mut parts = value.split_whitespace();
        match parts.next() {
            Some(scheme) if self.accepted.iter().any(|s| s == scheme) => {}
            _ => return Ok(None),
        }
        match (parts.next(), parts.next()) {
            (Some(token), None) => Ok(Some(token)),
            _ => Err(AuthError::MalformedHeader),
        }
    }

    /// Raw refresh token from the request cookies, if any.
    pub fn refresh_from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.refresh_cookie)
    }
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(key), Some(val)) = (key, val) {
                if key == name && !val.is_empty() {
                    return Some(val.trim_matches('"').to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SessionTransport {
        transport_with(&["Bearer"])
    }

    fn transport_with(schemes: &[&str]) -> SessionTransport {
        let mut config = AppConfig::for_tests();
        config.jwt.header_schemes = schemes.iter().map(|s| s.to_string()).collect();
        let keys = JwtKeys::from_config(&config.jwt).expect("keys");
        SessionTransport::new(&config, &keys)
    }

    fn headers_with(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn attach_sets_both_cookies() {
        let pair = TokenPair {
            access_token: "acc.tok.en".into(),
            refresh_token: "ref.tok.en".into(),
        };
        let mut headers = HeaderMap::new();
        transport().attach(&pair, &mut headers).expect("attach");

        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("Authorization=\"Bearer acc.tok.en\";"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("Max-Age=1800"));
        assert!(cookies[1].starts_with("refresh=ref.tok.en;"));
        assert!(cookies[1].contains("HttpOnly"));
        assert!(cookies[1].contains("Max-Age=1209600"));
        assert!(!cookies[1].contains("Secure"));
    }

    #[test]
    fn extract_without_header_is_anonymous() {
        assert!(matches!(transport().extract(&HeaderMap::new()), Ok(None)));
    }

    #[test]
    fn extract_strips_scheme() {
        let headers = headers_with(AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(transport().extract(&headers).unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn extract_ignores_other_schemes() {
        let headers = headers_with(AUTHORIZATION, "Basic dXNlcjpwYXNz");
        assert!(matches!(transport().extract(&headers), Ok(None)));
    }

    #[test]
    fn extract_accepts_every_listed_scheme() {
        let transport = transport_with(&["Bearer", "JWT"]);
        let headers = headers_with(AUTHORIZATION, "JWT abc.def.ghi");
        assert_eq!(transport.extract(&headers).unwrap(), Some("abc.def.ghi"));
        let headers = headers_with(AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(transport.extract(&headers).unwrap(), Some("abc.def.ghi"));
        let headers = headers_with(AUTHORIZATION, "Token abc.def.ghi");
        assert!(matches!(transport.extract(&headers), Ok(None)));
    }

    #[test]
    fn cookie_is_issued_with_the_first_scheme() {
        let pair = TokenPair {
            access_token: "acc.tok.en".into(),
            refresh_token: "ref.tok.en".into(),
        };
        let mut headers = HeaderMap::new();
        transport_with(&["JWT", "Bearer"])
            .attach(&pair, &mut headers)
            .expect("attach");
        let access = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(access.starts_with("Authorization=\"JWT acc.tok.en\";"));
    }

    #[test]
    fn extract_rejects_malformed_values() {
        let headers = headers_with(AUTHORIZATION, "Bearer");
        assert!(matches!(
            transport().extract(&headers),
            Err(AuthError::MalformedHeader)
        ));
        let headers = headers_with(AUTHORIZATION, "Bearer a b");
        assert!(matches!(
            transport().extract(&headers),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn refresh_cookie_is_read_back() {
        let headers = headers_with(COOKIE, "Authorization=\"Bearer x\"; refresh=r.t.k");
        assert_eq!(
            transport().refresh_from_cookie(&headers).as_deref(),
            Some("r.t.k")
        );
        assert!(transport().refresh_from_cookie(&HeaderMap::new()).is_none());
    }
}
