//! Bearer-token authentication
//!
//! Protected routes run behind [`auth_middleware`], which resolves the
//! caller to a [`UserIdentity`] and stores it in the request extensions.
//! An empty token list disables checking; every request then runs as the
//! anonymous identity.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ApiError, TaskError};
use crate::AppState;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub subject: String,
}

impl UserIdentity {
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
        }
    }
}

/// Opaque capability check
pub trait Authenticator: Send + Sync {
    /// Map a bearer credential (if any) to an identity, or `AccessDenied`
    fn authenticate(&self, bearer: Option<&str>) -> Result<UserIdentity, TaskError>;
}

/// Fixed set of accepted tokens from configuration
///
/// Callers are identified by the position of their token in the configured
/// list (`client-0`, `client-1`, ...) so tokens never reach the logs.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, usize>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut map = HashMap::new();
        for (index, token) in tokens.into_iter().enumerate() {
            map.entry(token).or_insert(index);
        }
        Self { tokens: map }
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, bearer: Option<&str>) -> Result<UserIdentity, TaskError> {
        if !self.is_enabled() {
            return Ok(UserIdentity::anonymous());
        }

        let token = bearer.ok_or_else(|| TaskError::AccessDenied("missing bearer token".into()))?;
        self.tokens
            .get(token)
            .map(|index| UserIdentity {
                subject: format!("client-{}", index),
            })
            .ok_or_else(|| TaskError::AccessDenied("unknown bearer token".into()))
    }
}

/// Extract the credential from `Authorization: Bearer <token>`
fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

/// Authentication middleware
///
/// Applied to protected routes only; `/health` and `/check_startup/` bypass it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state.authenticator.authenticate(bearer_token(&request))?;
    debug!(subject = %identity.subject, path = %request.uri().path(), "Request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_authenticator_is_anonymous() {
        let auth = StaticTokenAuthenticator::default();

        assert!(!auth.is_enabled());
        assert_eq!(auth.authenticate(None).unwrap(), UserIdentity::anonymous());
        assert_eq!(
            auth.authenticate(Some("anything")).unwrap(),
            UserIdentity::anonymous()
        );
    }

    #[test]
    fn test_enabled_authenticator_checks_token() {
        let auth = StaticTokenAuthenticator::new(vec!["first".to_string(), "s3cret".to_string()]);

        assert_eq!(auth.authenticate(Some("s3cret")).unwrap().subject, "client-1");
        assert!(matches!(
            auth.authenticate(Some("wrong")),
            Err(TaskError::AccessDenied(_))
        ));
        assert!(matches!(auth.authenticate(None), Err(TaskError::AccessDenied(_))));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "bearer abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc"));

        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
