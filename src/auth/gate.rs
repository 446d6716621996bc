// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-level token enforcement.
//!
//! [`AuthGate`] turns an `Authorization` header into an
//! [`AuthenticatedUser`]. It is shared by the middleware functions and the
//! extractors so both paths apply the same rules:
//!
//! 1. Header present, valid UTF-8, `Bearer <token>` with a non-empty token.
//! 2. Token verifies as an access token.
//! 3. Token is not on the revocation list, when one is configured.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::{AuthError, AuthenticatedUser, RevocationList, TokenManager};

const BEARER_PREFIX: &str = "Bearer ";

/// Verifies bearer tokens for incoming requests.
#[derive(Clone, Debug)]
pub struct AuthGate {
    tokens: Arc<TokenManager>,
    revocations: Option<Arc<RevocationList>>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self {
            tokens,
            revocations: None,
        }
    }

    /// Also reject tokens found on `revocations`.
    pub fn with_revocations(mut self, revocations: Arc<RevocationList>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    /// Extract the raw bearer token from request headers.
    pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = value
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .ok_or(AuthError::InvalidAuthHeader)?;

        if token.is_empty() {
            return Err(AuthError::InvalidAuthHeader);
        }
        Ok(token)
    }

    /// Required mode: the request must carry a valid access token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        let token = Self::bearer_token(headers)?;
        self.authenticate_token(token)
    }

    /// Verify a raw access token.
    pub fn authenticate_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.tokens.verify_access_token(token)?;

        if let Some(revocations) = &self.revocations {
            if revocations.is_revoked(token) {
                return Err(AuthError::TokenRevoked);
            }
        }

        Ok(AuthenticatedUser::from_claims(claims))
    }

    /// Optional mode: any absence or failure yields an anonymous caller.
    pub fn try_authenticate(&self, headers: &HeaderMap) -> Option<AuthenticatedUser> {
        match self.authenticate(headers) {
            Ok(user) => Some(user),
            Err(AuthError::MissingAuthHeader) => None,
            Err(err) => {
                tracing::debug!(reason = err.reason(), "optional auth fell back to anonymous");
                None
            }
        }
    }
}
