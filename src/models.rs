// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! Persistent identity records and the request/response structures used by
//! the REST API.
//!
//! ## Model Categories
//!
//! - **Identity records**: [`User`] and [`OAuthAccount`], owned by the
//!   storage layer. Token code reads them but never mutates them.
//! - **Auth API**: registration, login, refresh and logout payloads.
//! - **OAuth API**: callback response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;
use crate::oauth::Provider;

// =============================================================================
// Identifiers
// =============================================================================

/// Local user identifier.
///
/// Assigned by storage at creation time and never reused. Serialized as a
/// bare number, which is also its wire form in the `user_id` token claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OAuth account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Identity Records
// =============================================================================

/// A local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique across all users.
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. `None` for OAuth-only accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
}

/// Tokens issued to us by an external provider.
///
/// Cached so that later calls to the provider's API can be made on the
/// user's behalf. Refreshed on every callback.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An external provider identity linked to a local [`User`].
///
/// `(provider, provider_user_id)` is unique across all accounts; one user
/// may own several accounts on different providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub provider: Provider,
    pub provider_user_id: String,
    pub tokens: ProviderTokens,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating an [`OAuthAccount`].
#[derive(Debug, Clone)]
pub struct NewOAuthAccount {
    pub provider: Provider,
    pub provider_user_id: String,
    pub tokens: ProviderTokens,
}

// =============================================================================
// Auth API Models
// =============================================================================

/// Request body for `POST /v1/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for `POST /v1/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /v1/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Optional request body for `POST /v1/auth/logout`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Generic `{ "message": ... }` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Public part of a user returned after login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: UserId,
    pub username: String,
}

/// Response for `POST /v1/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: LoginUser,
}

// =============================================================================
// OAuth API Models
// =============================================================================

/// Public part of a linked user returned after an OAuth callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthUser {
    pub username: String,
    pub email: String,
    pub provider: Provider,
}

/// Response for `GET /v1/auth/oauth/{provider}/callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthResponse {
    pub message: String,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: OAuthUser,
}
