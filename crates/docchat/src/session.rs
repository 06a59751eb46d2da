//! Session cookie handling.
//!
//! A session is an opaque UUID v4 carried in one cookie. Upload routes
//! issue it on first use; list and delete routes only read it.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Cookie settings resolved from [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionCookies {
    name: String,
    max_age_secs: u64,
    secure: bool,
}

impl SessionCookies {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            max_age_secs: config.max_age_secs,
            secure: config.secure,
        }
    }

    /// The session id from the request's `Cookie` headers, if present and
    /// non-empty.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    }

    /// Return the existing session id, or mint a new one together with the
    /// `Set-Cookie` header that installs it.
    pub fn read_or_issue(&self, headers: &HeaderMap) -> (String, Option<HeaderValue>) {
        if let Some(existing) = self.read(headers) {
            return (existing, None);
        }
        let session_id = Uuid::new_v4().to_string();
        let header = self.set_cookie(&session_id);
        tracing::debug!("issued new session");
        (session_id, header)
    }

    /// `Set-Cookie` value for `session_id`. Always `Some` for a cookie name
    /// accepted by config validation.
    pub fn set_cookie(&self, session_id: &str) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly",
            self.name, session_id, self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; SameSite=None; Secure");
        } else {
            cookie.push_str("; SameSite=Lax");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

/// Append an optional `Set-Cookie` header to `headers`.
pub fn attach(headers: &mut HeaderMap, cookie: Option<HeaderValue>) {
    if let Some(value) = cookie {
        headers.append(SET_COOKIE, value);
    }
}
