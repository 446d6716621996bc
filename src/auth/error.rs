// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::TokenError;

/// Request rejection produced by the auth gate.
///
/// Every variant is a 401. The public `error_code` only separates a missing
/// header, a bad header, expiry, and everything else; the precise variant is
/// kept for logs and never reveals which secret failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header is not `Bearer <token>`
    InvalidAuthHeader,
    /// Token is not a parseable JWT
    MalformedToken,
    /// Signature or algorithm rejected
    InvalidSignature,
    /// Signature verified, claims unusable
    InvalidClaims,
    /// Token has expired
    TokenExpired,
    /// Token is on the revocation list
    TokenRevoked,
    /// Identity attached to the request does not hold together
    MalformedIdentity,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Public error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::TokenExpired => "token_expired",
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims
            | AuthError::TokenRevoked
            | AuthError::MalformedIdentity => "invalid_token",
        }
    }

    /// Precise reason, for logs only.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidClaims => "invalid_claims",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::MalformedIdentity => "malformed_identity",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TokenExpired => AuthError::TokenExpired,
            TokenError::SignatureInvalid => AuthError::InvalidSignature,
            TokenError::ClaimsInvalid => AuthError::InvalidClaims,
            TokenError::TokenInvalid | TokenError::Signing(_) => AuthError::MalformedToken,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims
            | AuthError::TokenRevoked
            | AuthError::MalformedIdentity => write!(f, "Token is invalid"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(
            reason = self.reason(),
            error_code = self.error_code(),
            "request rejected by auth gate"
        );
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let (status, body) = body_of(AuthError::MissingAuthHeader).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn signature_and_claims_failures_look_identical() {
        let (_, signature) = body_of(AuthError::InvalidSignature).await;
        let (_, claims) = body_of(AuthError::InvalidClaims).await;
        let (_, revoked) = body_of(AuthError::TokenRevoked).await;
        assert_eq!(signature, claims);
        assert_eq!(signature, revoked);
        assert_eq!(signature["error_code"], "invalid_token");
    }

    #[tokio::test]
    async fn expiry_is_distinguished() {
        let (status, body) = body_of(AuthError::from(TokenError::TokenExpired)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "token_expired");
    }
}
