//! Access control gate
//!
//! Every request outside the public allow-list must carry HTTP basic
//! credentials. The check is stateless: no session, no cookie, nothing kept
//! between requests.

use super::state::AppState;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Verifies a username/password pair
#[async_trait]
pub trait CredentialCheck: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single configured user
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl CredentialCheck for StaticCredentials {
    async fn verify(&self, username: &str, password: &str) -> bool {
        // Evaluate both so timing does not reveal which one failed.
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Public-route allow-list plus credential check
#[derive(Clone)]
pub struct AccessGate {
    check: Option<Arc<dyn CredentialCheck>>,
    public_paths: Arc<Vec<String>>,
    timeout: Duration,
}

impl AccessGate {
    pub fn new(check: Arc<dyn CredentialCheck>, public_paths: Vec<String>, timeout: Duration) -> Self {
        Self {
            check: Some(check),
            public_paths: Arc::new(public_paths),
            timeout,
        }
    }

    /// Gate that lets every request through
    pub fn disabled() -> Self {
        Self {
            check: None,
            public_paths: Arc::new(Vec::new()),
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.check.is_some()
    }

    /// Exact match, or a sub-path of a public route
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| {
            path == public
                || path
                    .strip_prefix(public.as_str())
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
        })
    }

    /// Check the request's credentials
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(check) = &self.check else {
            return Ok(());
        };

        let (username, password) = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_basic)
            .ok_or(ApiError::Unauthorized)?;

        match tokio::time::timeout(self.timeout, check.verify(&username, &password)).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::Unauthorized),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Credential check timed out");
                Err(ApiError::Unavailable("credential check timed out".into()))
            }
        }
    }
}

/// Decode `Basic <base64(user:pass)>`
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware applying the gate to every routed request
pub async fn access_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.gate.is_public(request.uri().path()) {
        return next.run(request).await;
    }

    match state.gate.authorize(request.headers()).await {
        Ok(()) => next.run(request).await,
        Err(e) => {
            debug!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected request: {}",
                e
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> AccessGate {
        AccessGate::new(
            Arc::new(StaticCredentials::new("meridian", "s3cret")),
            vec!["/health".into(), "/info".into()],
            Duration::from_millis(100),
        )
    }

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_public_paths() {
        let gate = gate();
        assert!(gate.is_public("/health"));
        assert!(gate.is_public("/health/live"));
        assert!(!gate.is_public("/healthz"));
        assert!(!gate.is_public("/instances"));
    }

    #[test]
    fn test_parse_basic() {
        assert_eq!(
            parse_basic("Basic bWVyaWRpYW46YTpi"),
            Some(("meridian".into(), "a:b".into()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[tokio::test]
    async fn test_authorize() {
        let gate = gate();
        assert!(gate.authorize(&basic("meridian", "s3cret")).await.is_ok());
        assert!(matches!(
            gate.authorize(&basic("meridian", "wrong")).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            gate.authorize(&HeaderMap::new()).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(AccessGate::disabled()
            .authorize(&HeaderMap::new())
            .await
            .is_ok());
    }

    struct SlowCheck;

    #[async_trait]
    impl CredentialCheck for SlowCheck {
        async fn verify(&self, _username: &str, _password: &str) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_times_out() {
        let gate = AccessGate::new(Arc::new(SlowCheck), vec![], Duration::from_millis(100));
        assert!(matches!(
            gate.authorize(&basic("a", "b")).await,
            Err(ApiError::Unavailable(_))
        ));
    }
}
