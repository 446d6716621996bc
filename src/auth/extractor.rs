// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! Behind `require_auth` the identity is read from request extensions.
//! Without the middleware the extractor verifies the header itself.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::{AuthError, AuthGate, AuthenticatedUser, IdentityLookup};

/// Extractor for a required authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(Auth(user): Auth) -> Json<Me> {
///     // user.user_id is the verified local user id
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    AuthGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match IdentityLookup::from_extensions(&parts.extensions) {
            IdentityLookup::Present(user) => Ok(Auth(user)),
            IdentityLookup::Malformed => Err(AuthError::MalformedIdentity),
            IdentityLookup::Absent => {
                let gate = AuthGate::from_ref(state);
                gate.authenticate(&parts.headers).map(Auth)
            }
        }
    }
}

/// Extractor that never rejects: `None` for anonymous callers.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AuthGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = match IdentityLookup::from_extensions(&parts.extensions) {
            IdentityLookup::Present(user) => Some(user),
            IdentityLookup::Malformed => None,
            IdentityLookup::Absent => AuthGate::from_ref(state).try_authenticate(&parts.headers),
        };
        Ok(OptionalAuth(user))
    }
}
