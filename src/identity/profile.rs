// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity as reported by a provider.

use crate::models::ProviderTokens;
use crate::oauth::Provider;

/// A provider-verified identity. Everything except `provider` comes from the
/// provider and is untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: Provider,
    pub provider_user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub tokens: ProviderTokens,
}

impl ProviderIdentity {
    /// Local username for a first-time identity.
    ///
    /// First non-blank of: display name, nickname, email local part.
    pub fn derive_username(&self) -> Option<String> {
        let local_part = self.email.split('@').next();
        [self.name.as_deref(), self.nickname.as_deref(), local_part]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .map(str::to_string)
    }
}
