// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use axum::http::Extensions;
use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// Claims carried by both access and refresh tokens.
///
/// The two token kinds share this shape; they differ only in lifetime and in
/// the secret they are signed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Local user identifier
    pub user_id: UserId,

    /// Username at the time of issue
    pub username: String,

    /// Issuer (configured, defaults to `ctflab`)
    pub iss: String,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl Claims {
    /// Build a claim set valid from `issued_at` for `lifetime_secs` seconds.
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        issuer: impl Into<String>,
        issued_at: i64,
        lifetime_secs: i64,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            iss: issuer.into(),
            iat: issued_at,
            exp: issued_at.saturating_add(lifetime_secs),
        }
    }

    /// A token is valid iff `now < exp`. `leeway` widens that window and is
    /// zero unless explicitly configured.
    pub fn is_expired_at(&self, now: i64, leeway: i64) -> bool {
        now >= self.exp.saturating_add(leeway)
    }

    /// Structural validity of a signature-checked claim set.
    ///
    /// The signature proves we issued the token; this rejects claim sets we
    /// would never have issued.
    pub fn is_well_formed(&self, expected_issuer: &str) -> bool {
        !self.username.trim().is_empty() && self.iss == expected_issuer && self.iat <= self.exp
    }

    /// Seconds left until expiry, clamped at zero.
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }
}

/// Authenticated user information extracted from a verified access token.
///
/// This is what AuthGate attaches to request extensions and what handlers
/// receive through the `Auth` extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
    /// Full verified claim set
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// Create from verified claims.
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username.clone(),
            claims,
        }
    }

    /// The identity fields must agree with the claims they were derived from.
    pub fn is_consistent(&self) -> bool {
        self.user_id == self.claims.user_id
            && self.username == self.claims.username
            && !self.username.trim().is_empty()
    }
}

/// Result of looking up the caller's identity in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    /// A consistent identity was attached by AuthGate.
    Present(AuthenticatedUser),
    /// Something was attached but it does not hold together. Never trust it.
    Malformed,
    /// No identity; the caller is anonymous.
    Absent,
}

impl IdentityLookup {
    /// Inspect request extensions for an attached identity.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        match extensions.get::<AuthenticatedUser>() {
            Some(user) if user.is_consistent() => IdentityLookup::Present(user.clone()),
            Some(_) => IdentityLookup::Malformed,
            None => IdentityLookup::Absent,
        }
    }

    /// Collapse to an optional identity; malformed counts as absent.
    pub fn into_user(self) -> Option<AuthenticatedUser> {
        match self {
            IdentityLookup::Present(user) => Some(user),
            IdentityLookup::Malformed | IdentityLookup::Absent => None,
        }
    }
}
