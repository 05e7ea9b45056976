//! Request authentication for the passpush web service.
//!
//! # Token Types
//!
//! - **Push token**: the subject's `authenticationToken`, echoed by Safari as
//!   `Authorization: ApplePushNotifications <token>` on registration calls
//! - **Admin token**: `Authorization: Bearer <token>` on the trigger endpoint
//!
//! Tokens are compared through their SHA-256 hashes so the comparison does not
//! short-circuit on the first differing byte of the secret itself.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ring::digest::{digest, SHA256};
use serde::Serialize;

/// Authorization scheme Safari uses for web-service calls
pub const PUSH_SCHEME: &str = "ApplePushNotifications";

/// Hash a token using SHA-256 and return hex-encoded result
pub fn hash_token(token: &str) -> String {
    let hash = digest(&SHA256, token.as_bytes());
    hex::encode(hash.as_ref())
}

/// Check a presented token against the expected one.
pub fn verify_token(presented: &str, expected: &str) -> bool {
    hash_token(presented) == hash_token(expected)
}

/// Authorization error
#[derive(Debug)]
pub enum AuthError {
    /// Missing Authorization header
    MissingHeader,
    /// Invalid Authorization header format
    InvalidHeader,
    /// Token verification failed
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "MISSING_AUTH",
                "Authorization header required",
            ),
            AuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "INVALID_AUTH",
                "Invalid Authorization header format",
            ),
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid token",
            ),
        };

        let body = Json(AuthErrorResponse {
            error: message.to_string(),
            code,
        });

        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(authorization: &str) -> Option<&str> {
    authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("bearer "))
}

/// Extract the token from an `ApplePushNotifications <token>` header value
pub fn extract_push_token(authorization: &str) -> Option<&str> {
    authorization
        .strip_prefix(PUSH_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authorization_header(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)
}

/// Verify the push token on a registration request
pub fn require_push_token(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
    let token = extract_push_token(authorization_header(headers)?).ok_or(AuthError::InvalidHeader)?;
    if verify_token(token, expected) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized)
    }
}

/// Verify the admin bearer token
pub fn require_bearer_token(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
    let token =
        extract_bearer_token(authorization_header(headers)?).ok_or(AuthError::InvalidHeader)?;
    if verify_token(token, expected) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn hash_token_works() {
        let token = "19f8d7a6e9fb8a7f6d9330dabe";
        let hash = hash_token(token);

        // Should be 64 hex chars (32 bytes SHA-256)
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        // Should be deterministic
        assert_eq!(hash, hash_token(token));
    }

    #[test]
    fn extract_bearer_token_works() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer ABC123"), Some("ABC123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("abc123"), None);
    }

    #[test]
    fn extract_push_token_works() {
        assert_eq!(
            extract_push_token("ApplePushNotifications abc123"),
            Some("abc123")
        );
        assert_eq!(extract_push_token("ApplePushNotifications "), None);
        assert_eq!(extract_push_token("ApplePushNotificationsabc"), None);
        assert_eq!(extract_push_token("Bearer abc123"), None);
    }

    #[test]
    fn require_push_token_checks_scheme_and_value() {
        assert!(require_push_token(&headers("ApplePushNotifications secret"), "secret").is_ok());
        assert!(matches!(
            require_push_token(&headers("ApplePushNotifications wrong"), "secret"),
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            require_push_token(&headers("Bearer secret"), "secret"),
            Err(AuthError::InvalidHeader)
        ));
        assert!(matches!(
            require_push_token(&HeaderMap::new(), "secret"),
            Err(AuthError::MissingHeader)
        ));
    }

    #[test]
    fn require_bearer_token_checks_value() {
        assert!(require_bearer_token(&headers("Bearer admin"), "admin").is_ok());
        assert!(matches!(
            require_bearer_token(&headers("Bearer nope"), "admin"),
            Err(AuthError::Unauthorized)
        ));
    }
}
