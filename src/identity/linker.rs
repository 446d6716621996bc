// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolve an external identity to a local user and issue tokens.
//!
//! ## Resolution
//!
//! 1. Known `(provider, provider_user_id)`: load the owning user and store
//!    the provider tokens from this callback.
//! 2. Unknown identity whose derived username belongs to an existing user:
//!    attach a new OAuth account to that user, if [`LinkPolicy`] allows it.
//! 3. Otherwise create the user and the account in one transaction.
//!
//! ## Concurrency
//!
//! Two first callbacks for the same identity can both miss step 1. Storage
//! lets exactly one insert win; the loser sees a conflict, re-reads, and
//! continues from the winner's rows. Nothing here holds a lock.

use std::sync::Arc;

use super::ProviderIdentity;
use crate::auth::{TokenError, TokenManager, TokenPair};
use crate::models::{NewOAuthAccount, NewUser, OAuthAccount, User};
use crate::oauth::Provider;
use crate::storage::{IdentityStore, StorageError};

/// Attempts before a persistent conflict is reported.
pub const MAX_LINK_ATTEMPTS: usize = 3;

/// Trust decisions made while linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Attach a first-time identity to an existing user with the same
    /// username. Enabling this trusts the provider-reported name.
    pub link_by_username: bool,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            link_by_username: true,
        }
    }
}

/// How the identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Identity was already linked.
    Existing,
    /// Attached to a user found by username.
    LinkedByUsername,
    /// New user created.
    Created,
}

impl LinkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOutcome::Existing => "existing",
            LinkOutcome::LinkedByUsername => "linked_by_username",
            LinkOutcome::Created => "created",
        }
    }
}

/// A resolved identity plus freshly issued tokens.
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    pub user: User,
    pub account: OAuthAccount,
    pub outcome: LinkOutcome,
    pub tokens: TokenPair,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Passed through unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("identity {provider}/{provider_user_id} kept conflicting")]
    IdentityConflict {
        provider: Provider,
        provider_user_id: String,
    },

    #[error("provider identity has no usable id or username")]
    InvalidIdentity,

    #[error("username {0} belongs to another user")]
    UsernameTaken(String),

    #[error("failed to issue tokens: {0}")]
    Token(#[from] TokenError),
}

/// Links provider identities to local users.
pub struct IdentityLinker {
    store: Arc<dyn IdentityStore>,
    tokens: Arc<TokenManager>,
    policy: LinkPolicy,
}

impl IdentityLinker {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: Arc<TokenManager>, policy: LinkPolicy) -> Self {
        Self {
            store,
            tokens,
            policy,
        }
    }

    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Resolve `identity` and issue a token pair for the local user.
    pub async fn link(&self, identity: &ProviderIdentity) -> Result<LinkedIdentity, LinkError> {
        if identity.provider_user_id.trim().is_empty() {
            return Err(LinkError::InvalidIdentity);
        }

        for attempt in 1..=MAX_LINK_ATTEMPTS {
            match self.resolve(identity).await {
                Ok((user, account, outcome)) => {
                    let tokens = self.tokens.generate_token_pair(user.id, &user.username)?;
                    tracing::info!(
                        provider = %identity.provider,
                        user_id = %user.id,
                        outcome = outcome.as_str(),
                        "oauth identity linked"
                    );
                    return Ok(LinkedIdentity {
                        user,
                        account,
                        outcome,
                        tokens,
                    });
                }
                Err(LinkError::Storage(err)) if err.is_conflict() => {
                    tracing::warn!(
                        provider = %identity.provider,
                        attempt,
                        error = %err,
                        "concurrent link detected, re-reading"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(LinkError::IdentityConflict {
            provider: identity.provider,
            provider_user_id: identity.provider_user_id.clone(),
        })
    }

    async fn resolve(
        &self,
        identity: &ProviderIdentity,
    ) -> Result<(User, OAuthAccount, LinkOutcome), LinkError> {
        let store = &self.store;

        if let Some(account) = store
            .find_account_by_provider_id(identity.provider, &identity.provider_user_id)
            .await?
        {
            let user = store
                .get_user_by_id(account.user_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("user {}", account.user_id)))?;
            let account = store
                .update_account_tokens(account.id, &identity.tokens)
                .await?;
            return Ok((user, account, LinkOutcome::Existing));
        }

        let username = identity
            .derive_username()
            .ok_or(LinkError::InvalidIdentity)?;
        let new_account = NewOAuthAccount {
            provider: identity.provider,
            provider_user_id: identity.provider_user_id.clone(),
            tokens: identity.tokens.clone(),
        };

        if let Some(existing) = store.find_user_by_username(&username).await? {
            if !self.policy.link_by_username {
                return Err(LinkError::UsernameTaken(username));
            }
            let account = store.create_account(existing.id, new_account).await?;
            return Ok((existing, account, LinkOutcome::LinkedByUsername));
        }

        let new_user = NewUser {
            username,
            email: identity.email.clone(),
            password_hash: None,
        };
        let (user, account) = store
            .create_user_with_account(new_user, new_account)
            .await?;
        Ok((user, account, LinkOutcome::Created))
    }
}
