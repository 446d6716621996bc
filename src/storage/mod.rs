// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Storage
//!
//! Persistence for users and linked OAuth accounts.
//!
//! ## Guarantees
//!
//! - `username` is unique across users
//! - `email` is unique across credential (password) users
//! - `(provider, provider_user_id)` is unique across OAuth accounts
//!
//! Every create checks these inside the same write transaction that inserts
//! the row and fails with [`StorageError::Conflict`], so two racing creates
//! can never both succeed.
//!
//! Finds return `Ok(None)` when nothing matches; `Err` always means the
//! backend failed.

pub mod database;

use async_trait::async_trait;

use crate::models::{AccountId, NewOAuthAccount, NewUser, OAuthAccount, ProviderTokens, User, UserId};
use crate::oauth::Provider;

pub use database::IdentityDatabase;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("{entity} already exists")]
    Conflict { entity: &'static str },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("redb error: {0}")]
    Backend(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

macro_rules! backend_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    StorageError::Backend(err.into())
                }
            }
        )*
    };
}

backend_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage collaborator used by the identity linker and the API handlers.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_account_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> StorageResult<Option<OAuthAccount>>;

    /// Attach a new OAuth account to an existing user.
    async fn create_account(
        &self,
        user_id: UserId,
        account: NewOAuthAccount,
    ) -> StorageResult<OAuthAccount>;

    /// Replace the cached provider tokens of an account.
    async fn update_account_tokens(
        &self,
        account_id: AccountId,
        tokens: &ProviderTokens,
    ) -> StorageResult<OAuthAccount>;

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;

    /// Oldest user registered with this email (case-insensitive).
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    async fn create_user(&self, user: NewUser) -> StorageResult<User>;

    async fn get_user_by_id(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Create a user and its first OAuth account in one transaction.
    ///
    /// Either both rows exist afterwards or neither does.
    async fn create_user_with_account(
        &self,
        user: NewUser,
        account: NewOAuthAccount,
    ) -> StorageResult<(User, OAuthAccount)>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> StorageResult<()>;
}
