//! Client-held session ticket carried in an encrypted, authenticated cookie.
//!
//! Nothing is stored server-side. A cookie that fails to decrypt, parse or
//! validate is treated exactly like a missing one.

use anyhow::{Result, anyhow};
use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::{Cookie, CookieJar, Key, SameSite};
use tracing::warn;

use crate::config::SessionConfig;

pub const AUTH_SCHEME: &str = "Cookies";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    /// Identity id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub scheme: String,
    /// Issued with `remember_me`; the cookie then carries `Max-Age`.
    pub persistent: bool,
}

impl SessionTicket {
    #[must_use]
    pub fn new(user_id: &str, now: DateTime<Utc>, lifetime: Duration, persistent: bool) -> Self {
        Self {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            scheme: AUTH_SCHEME.to_string(),
            persistent,
        }
    }

    #[must_use]
    pub const fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// True once more than half of the validity window has elapsed.
    #[must_use]
    pub const fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.timestamp() - self.iat;
        let remaining = self.exp - now.timestamp();
        elapsed > remaining
    }
}

/// Seals and opens session cookies with the process key.
#[derive(Clone)]
pub struct SessionCookies {
    key: Key,
    name: String,
    lifetime: Duration,
    sliding: bool,
    secure: bool,
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookies")
            .field("name", &self.name)
            .field("lifetime", &self.lifetime)
            .field("sliding", &self.sliding)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionCookies {
    pub fn new(config: &SessionConfig, secure: bool) -> Result<Self> {
        let key = if config.secret.is_empty() {
            warn!("No session secret configured, generating a random key; sessions will not survive a restart");
            Key::generate()
        } else {
            Key::try_from(config.secret.as_bytes())
                .map_err(|e| anyhow!("Invalid session secret: {e}"))?
        };

        Ok(Self {
            key,
            name: config.cookie_name.clone(),
            lifetime: Duration::days(config.expire_days),
            sliding: config.sliding_expiration,
            secure,
        })
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    /// Creates a fresh ticket and the `Set-Cookie` value carrying it.
    pub fn issue(
        &self,
        user_id: &str,
        persistent: bool,
        now: DateTime<Utc>,
    ) -> Result<(SessionTicket, HeaderValue)> {
        let ticket = SessionTicket::new(user_id, now, self.lifetime, persistent);
        let header = self.seal(&ticket)?;
        Ok((ticket, header))
    }

    pub fn seal(&self, ticket: &SessionTicket) -> Result<HeaderValue> {
        let payload = serde_json::to_string(ticket)?;

        let mut builder = Cookie::build((self.name.clone(), payload))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure);

        if ticket.persistent {
            builder = builder.max_age(time::Duration::seconds(ticket.exp - ticket.iat));
        }

        let mut jar = CookieJar::new();
        jar.private_mut(&self.key).add(builder.build());

        let sealed = jar
            .get(&self.name)
            .ok_or_else(|| anyhow!("Sealed session cookie missing from jar"))?;

        HeaderValue::from_str(&sealed.to_string())
            .map_err(|e| anyhow!("Session cookie is not a valid header value: {e}"))
    }

    /// Reads and validates the ticket from the request's `Cookie` headers.
    #[must_use]
    pub fn open(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Option<SessionTicket> {
        let mut jar = CookieJar::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse(raw).flatten() {
                jar.add_original(cookie.into_owned());
            }
        }

        let cookie = jar.private(&self.key).get(&self.name)?;
        let ticket: SessionTicket = serde_json::from_str(cookie.value()).ok()?;

        if ticket.scheme != AUTH_SCHEME || ticket.sub.is_empty() || ticket.is_expired(now) {
            return None;
        }

        Some(ticket)
    }

    /// Re-issues a ticket past the half-way mark, keeping its persistence.
    pub fn renew(&self, ticket: &SessionTicket, now: DateTime<Utc>) -> Result<Option<HeaderValue>> {
        if !self.sliding || !ticket.needs_renewal(now) {
            return Ok(None);
        }

        let renewed = SessionTicket::new(&ticket.sub, now, self.lifetime, ticket.persistent);
        self.seal(&renewed).map(Some)
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear(&self) -> Result<HeaderValue> {
        let mut cookie = Cookie::build((self.name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();
        cookie.make_removal();

        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| anyhow!("Removal cookie is not a valid header value: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookies() -> SessionCookies {
        SessionCookies::new(&SessionConfig::default(), false).unwrap()
    }

    fn request_headers(set_cookie: &HeaderValue) -> HeaderMap {
        let pair = set_cookie
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        headers
    }

    #[test]
    fn test_issued_cookie_opens_to_same_ticket() {
        let cookies = cookies();
        let now = Utc::now();
        let (ticket, header) = cookies.issue("user-1", false, now).unwrap();

        let raw = header.to_str().unwrap();
        assert!(raw.starts_with("ECommerceAuth="));
        assert!(raw.contains("HttpOnly"));
        assert!(raw.contains("SameSite=Lax"));
        assert!(raw.contains("Path=/"));
        assert!(!raw.contains("Max-Age"));
        assert!(!raw.contains("user-1"));

        let opened = cookies.open(&request_headers(&header), now).unwrap();
        assert_eq!(opened, ticket);
        assert_eq!(opened.scheme, AUTH_SCHEME);
    }

    #[test]
    fn test_remember_me_sets_max_age() {
        let cookies = cookies();
        let (_, header) = cookies.issue("user-1", true, Utc::now()).unwrap();
        assert!(header.to_str().unwrap().contains("Max-Age=604800"));
    }

    #[test]
    fn test_expired_ticket_is_rejected() {
        let cookies = cookies();
        let issued = Utc::now() - Duration::days(8);
        let (_, header) = cookies.issue("user-1", false, issued).unwrap();

        assert!(cookies.open(&request_headers(&header), Utc::now()).is_none());
    }

    #[test]
    fn test_tampered_or_foreign_cookie_is_rejected() {
        let cookies = cookies();
        let now = Utc::now();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("ECommerceAuth=bm90LWEtdmFsaWQtY29va2ll"),
        );
        assert!(cookies.open(&headers, now).is_none());

        let (_, header) = self::cookies().issue("user-1", false, now).unwrap();
        assert!(cookies.open(&request_headers(&header), now).is_none());

        assert!(cookies.open(&HeaderMap::new(), now).is_none());
    }

    #[test]
    fn test_sliding_renewal_after_half_window() {
        let cookies = cookies();
        let issued = Utc::now();
        let (ticket, _) = cookies.issue("user-1", true, issued).unwrap();

        assert!(cookies.renew(&ticket, issued + Duration::days(2)).unwrap().is_none());

        let renewed = cookies
            .renew(&ticket, issued + Duration::days(4))
            .unwrap()
            .unwrap();
        let later = issued + Duration::days(4);
        let reopened = cookies.open(&request_headers(&renewed), later).unwrap();
        assert_eq!(reopened.sub, "user-1");
        assert!(reopened.persistent);
        assert_eq!(reopened.iat, later.timestamp());
    }

    #[test]
    fn test_clear_expires_cookie() {
        let raw = cookies().clear().unwrap();
        let raw = raw.to_str().unwrap();
        assert!(raw.starts_with("ECommerceAuth=;"));
        assert!(raw.contains("Max-Age=0"));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let config = SessionConfig {
            secret: "short".to_string(),
            ..SessionConfig::default()
        };
        assert!(SessionCookies::new(&config, true).is_err());
    }
}
