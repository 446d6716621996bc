// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{AuthGate, RevocationList, TokenManager};
use crate::config::{AppConfig, ConfigError};
use crate::identity::{IdentityLinker, LinkPolicy};
use crate::oauth::{HttpProviderClient, ProviderClient, StateSigner};
use crate::storage::IdentityStore;

/// Shared collaborators, built once at startup and cloned into handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub store: Arc<dyn IdentityStore>,
    pub linker: Arc<IdentityLinker>,
    pub gate: AuthGate,
    pub revocations: Arc<RevocationList>,
    pub providers: Arc<dyn ProviderClient>,
    /// `None` when no OAuth provider is configured.
    pub state_signer: Option<StateSigner>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn IdentityStore>) -> Result<Self, ConfigError> {
        let tokens = Arc::new(TokenManager::new(&config.tokens)?);
        let revocations = Arc::new(RevocationList::new(config.revocation_capacity));
        let gate = AuthGate::new(tokens.clone()).with_revocations(revocations.clone());
        let linker = Arc::new(IdentityLinker::new(
            store.clone(),
            tokens.clone(),
            LinkPolicy {
                link_by_username: config.oauth.link_by_username,
            },
        ));
        let state_signer = config.oauth.state_secret.as_deref().map(StateSigner::new);

        Ok(Self {
            tokens,
            store,
            linker,
            gate,
            revocations,
            providers: Arc::new(HttpProviderClient::new(config.oauth.clone())),
            state_signer,
        })
    }

    /// Replace the provider client.
    pub fn with_provider_client(mut self, providers: Arc<dyn ProviderClient>) -> Self {
        self.providers = providers;
        self
    }
}

impl FromRef<AppState> for AuthGate {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}
