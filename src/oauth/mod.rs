// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # OAuth Handshake
//!
//! Authorization-code flow against external identity providers.
//!
//! ## Flow
//!
//! 1. `GET /v1/auth/oauth/{provider}` redirects to the provider with a signed
//!    `state` ([`StateSigner`])
//! 2. The provider redirects back to `/v1/auth/oauth/{provider}/callback`
//!    with `code` and `state`
//! 3. `state` is verified, the code is exchanged and the profile fetched
//!    ([`ProviderClient`])
//! 4. The resulting identity goes to the identity linker
//!
//! No server-side session is kept for the handshake.

pub mod client;
pub mod state;

use serde::{Deserialize, Serialize};

pub use client::{HttpProviderClient, ProviderClient};
pub use state::StateSigner;

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::GitHub, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::Google => "google",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| OAuthError::UnknownProvider(s.to_string()))
    }
}

/// OAuth handshake failures.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider {0} is not configured")]
    NotConfigured(Provider),

    #[error("invalid state parameter: {0}")]
    InvalidState(&'static str),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("profile fetch failed: {0}")]
    Profile(String),

    #[error("failed to build authorization URL: {0}")]
    Url(#[from] url::ParseError),
}
