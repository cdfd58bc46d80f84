//! Request-scoped identity resolution.
//!
//! A pure read of ambient request context: the anonymous identity comes
//! from a client-set header or cookie, the authenticated identity from a
//! session lookup. Neither is fabricated; an empty snapshot is a valid and
//! common outcome (first visit, blocked cookies). Both dimensions are
//! resolved once, up front, and the snapshot is immutable for the rest of
//! the request.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::Result;
use beacon_core::identity::{AnonymousId, IdentitySnapshot, UserId};

/// Header carrying the anonymous identity token.
pub const ANON_ID_HEADER: &str = "x-beacon-anon-id";

/// Cookie carrying the anonymous identity token.
pub const ANON_ID_COOKIE: &str = "beacon_anon_id";

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "beacon_session";

/// Authenticated-session lookup.
///
/// Implementations consult the platform's session service. Lookup failures
/// and unknown tokens both resolve to `None`: identity is never guessed.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Resolves a session token to an authenticated user, if the session
    /// is valid.
    async fn lookup(&self, session_token: &str) -> Result<Option<UserId>>;
}

/// In-memory session store for tests and local development.
#[derive(Debug, Default)]
pub struct StaticSessionStore {
    sessions: HashMap<String, UserId>,
}

impl StaticSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session token for a user.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.sessions.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl SessionStore for StaticSessionStore {
    async fn lookup(&self, session_token: &str) -> Result<Option<UserId>> {
        Ok(self.sessions.get(session_token).cloned())
    }
}

/// Resolves the identity snapshot for a request.
///
/// Anonymous identity: `x-beacon-anon-id` header, falling back to the
/// `beacon_anon_id` cookie. Authenticated identity: bearer token from the
/// `Authorization` header, falling back to the `beacon_session` cookie,
/// resolved through the session store.
///
/// # Errors
///
/// Returns an error only if the session store itself fails; malformed
/// tokens resolve to an absent identity.
pub async fn resolve_identity(
    headers: &HeaderMap,
    sessions: &Arc<dyn SessionStore>,
) -> Result<IdentitySnapshot> {
    let anonymous_id = anon_token(headers).and_then(|raw| AnonymousId::new(raw).ok());

    let user_id = match session_token(headers) {
        Some(token) => sessions.lookup(&token).await?,
        None => None,
    };

    Ok(IdentitySnapshot::new(user_id, anonymous_id))
}

fn anon_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(ANON_ID_HEADER).and_then(|v| v.to_str().ok()) {
        if !value.trim().is_empty() {
            return Some(value.to_string());
        }
    }
    cookie_value(headers, ANON_ID_COOKIE)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
    }
    cookie_value(headers, SESSION_COOKIE)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sessions() -> Arc<dyn SessionStore> {
        Arc::new(
            StaticSessionStore::new().with_session("tok-1", UserId::new("u1").unwrap()),
        )
    }

    #[tokio::test]
    async fn test_no_signals_yields_empty_snapshot() {
        let snapshot = resolve_identity(&HeaderMap::new(), &sessions())
            .await
            .expect("resolve");
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_anon_header_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(ANON_ID_HEADER, HeaderValue::from_static("a-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("beacon_anon_id=a-cookie; other=1"),
        );

        let snapshot = resolve_identity(&headers, &sessions()).await.expect("resolve");
        assert_eq!(
            snapshot.anonymous_id.as_ref().map(AnonymousId::as_str),
            Some("a-header")
        );
    }

    #[tokio::test]
    async fn test_session_resolves_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        let snapshot = resolve_identity(&headers, &sessions()).await.expect("resolve");
        assert_eq!(snapshot.user_id.as_ref().map(UserId::as_str), Some("u1"));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("beacon_session=tok-1"));
        let snapshot = resolve_identity(&headers, &sessions()).await.expect("resolve");
        assert_eq!(snapshot.user_id.as_ref().map(UserId::as_str), Some("u1"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_an_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer expired"));
        headers.insert(ANON_ID_HEADER, HeaderValue::from_static("a1"));

        let snapshot = resolve_identity(&headers, &sessions()).await.expect("resolve");
        assert!(snapshot.user_id.is_none());
        assert!(snapshot.anonymous_id.is_some());
    }
}
