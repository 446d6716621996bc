// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized [`User`]
//! - `username_index`: username → user id (unique)
//! - `email_index`: lowercase email → user ids (multimap)
//! - `oauth_accounts`: account id → serialized [`OAuthAccount`]
//! - `provider_index`: `provider/provider_user_id` → account id (unique)
//! - `sequences`: name → last assigned id
//!
//! redb serializes write transactions, so a uniqueness check followed by an
//! insert in the same transaction cannot interleave with another writer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition, WriteTransaction,
};

use super::{IdentityStore, StorageError, StorageResult};
use crate::models::{
    AccountId, NewOAuthAccount, NewUser, OAuthAccount, ProviderTokens, User, UserId,
};
use crate::oauth::Provider;

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

const USERNAME_INDEX: TableDefinition<&str, u64> = TableDefinition::new("username_index");

/// Non-unique: OAuth-created users may share an address with another user.
const EMAIL_INDEX: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("email_index");

const OAUTH_ACCOUNTS: TableDefinition<u64, &[u8]> = TableDefinition::new("oauth_accounts");

const PROVIDER_INDEX: TableDefinition<&str, u64> = TableDefinition::new("provider_index");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const USER_SEQUENCE: &str = "user";
const ACCOUNT_SEQUENCE: &str = "oauth_account";

// =============================================================================
// Key Helpers
// =============================================================================

fn provider_key(provider: Provider, provider_user_id: &str) -> String {
    format!("{}/{}", provider.as_str(), provider_user_id)
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// IdentityDatabase
// =============================================================================

/// redb-backed identity store. Cheap to clone.
#[derive(Clone)]
pub struct IdentityDatabase {
    db: Arc<Database>,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Backend(redb::StorageError::Io(e).into()))?;
            }
        }
        Self::init(Database::create(path)?)
    }

    /// Volatile database, for tests.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAME_INDEX)?;
            let _ = write_txn.open_multimap_table(EMAIL_INDEX)?;
            let _ = write_txn.open_table(OAUTH_ACCOUNTS)?;
            let _ = write_txn.open_table(PROVIDER_INDEX)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn user_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id.0)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERNAME_INDEX)?;
        let Some(id) = index.get(username)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(StorageError::NotFound(format!(
                "user {id} referenced by username index"
            ))),
        }
    }

    pub fn user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let key = email_key(email);
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(EMAIL_INDEX)?;
        // Values are ordered, so the first id is the oldest user.
        let first = match index.get(key.as_str())?.next() {
            Some(entry) => entry?.value(),
            None => return Ok(None),
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(first)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(StorageError::NotFound(format!(
                "user {first} referenced by email index"
            ))),
        }
    }

    pub fn insert_user(&self, new_user: NewUser) -> StorageResult<User> {
        let write_txn = self.db.begin_write()?;
        let user = put_user(&write_txn, new_user)?;
        write_txn.commit()?;
        Ok(user)
    }

    // =========================================================================
    // OAuth Accounts
    // =========================================================================

    pub fn account_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> StorageResult<Option<OAuthAccount>> {
        let key = provider_key(provider, provider_user_id);
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PROVIDER_INDEX)?;
        let Some(id) = index.get(key.as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let accounts = read_txn.open_table(OAUTH_ACCOUNTS)?;
        match accounts.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Err(StorageError::NotFound(format!(
                "oauth account {id} referenced by provider index"
            ))),
        }
    }

    pub fn insert_account(
        &self,
        user_id: UserId,
        new_account: NewOAuthAccount,
    ) -> StorageResult<OAuthAccount> {
        let write_txn = self.db.begin_write()?;
        let account = put_account(&write_txn, user_id, new_account)?;
        write_txn.commit()?;
        Ok(account)
    }

    pub fn insert_user_with_account(
        &self,
        new_user: NewUser,
        new_account: NewOAuthAccount,
    ) -> StorageResult<(User, OAuthAccount)> {
        let write_txn = self.db.begin_write()?;
        // Dropping the transaction on error discards the user row as well.
        let user = put_user(&write_txn, new_user)?;
        let account = put_account(&write_txn, user.id, new_account)?;
        write_txn.commit()?;
        Ok((user, account))
    }

    pub fn set_account_tokens(
        &self,
        id: AccountId,
        tokens: &ProviderTokens,
    ) -> StorageResult<OAuthAccount> {
        let write_txn = self.db.begin_write()?;
        let account = {
            let mut table = write_txn.open_table(OAUTH_ACCOUNTS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(id.0)?
                    .ok_or_else(|| StorageError::NotFound(format!("oauth account {id}")))?;
                existing.value().to_vec()
            };

            let mut account: OAuthAccount = serde_json::from_slice(&existing_bytes)?;
            account.tokens = tokens.clone();
            account.updated_at = Utc::now();

            let json = serde_json::to_vec(&account)?;
            table.insert(id.0, json.as_slice())?;
            account
        };
        write_txn.commit()?;
        Ok(account)
    }

    /// Open a read transaction to prove the database is usable.
    pub fn check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SEQUENCES)?;
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&IdentityDatabase) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

// =============================================================================
// Write Helpers
// =============================================================================

fn next_id(write_txn: &WriteTransaction, sequence: &str) -> StorageResult<u64> {
    let mut table = write_txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn put_user(write_txn: &WriteTransaction, new_user: NewUser) -> StorageResult<User> {
    let email = email_key(&new_user.email);
    {
        let usernames = write_txn.open_table(USERNAME_INDEX)?;
        if usernames.get(new_user.username.as_str())?.is_some() {
            return Err(StorageError::Conflict { entity: "username" });
        }
    }
    if new_user.password_hash.is_some() {
        let emails = write_txn.open_multimap_table(EMAIL_INDEX)?;
        if !emails.get(email.as_str())?.is_empty() {
            return Err(StorageError::Conflict { entity: "email" });
        }
    }

    let id = UserId(next_id(write_txn, USER_SEQUENCE)?);
    let user = User {
        id,
        username: new_user.username,
        email: new_user.email,
        password_hash: new_user.password_hash,
        created_at: Utc::now(),
    };

    let json = serde_json::to_vec(&user)?;
    write_txn.open_table(USERS)?.insert(id.0, json.as_slice())?;
    write_txn
        .open_table(USERNAME_INDEX)?
        .insert(user.username.as_str(), id.0)?;
    write_txn
        .open_multimap_table(EMAIL_INDEX)?
        .insert(email.as_str(), id.0)?;
    Ok(user)
}

fn put_account(
    write_txn: &WriteTransaction,
    user_id: UserId,
    new_account: NewOAuthAccount,
) -> StorageResult<OAuthAccount> {
    let key = provider_key(new_account.provider, &new_account.provider_user_id);
    {
        let index = write_txn.open_table(PROVIDER_INDEX)?;
        if index.get(key.as_str())?.is_some() {
            return Err(StorageError::Conflict {
                entity: "oauth account",
            });
        }
    }
    {
        let users = write_txn.open_table(USERS)?;
        if users.get(user_id.0)?.is_none() {
            return Err(StorageError::NotFound(format!("user {user_id}")));
        }
    }

    let id = AccountId(next_id(write_txn, ACCOUNT_SEQUENCE)?);
    let now = Utc::now();
    let account = OAuthAccount {
        id,
        user_id,
        provider: new_account.provider,
        provider_user_id: new_account.provider_user_id,
        tokens: new_account.tokens,
        created_at: now,
        updated_at: now,
    };

    let json = serde_json::to_vec(&account)?;
    write_txn
        .open_table(OAUTH_ACCOUNTS)?
        .insert(id.0, json.as_slice())?;
    write_txn
        .open_table(PROVIDER_INDEX)?
        .insert(key.as_str(), id.0)?;
    Ok(account)
}

// =============================================================================
// IdentityStore
// =============================================================================

#[async_trait]
impl IdentityStore for IdentityDatabase {
    async fn find_account_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> StorageResult<Option<OAuthAccount>> {
        let provider_user_id = provider_user_id.to_string();
        self.blocking(move |db| db.account_by_provider_id(provider, &provider_user_id))
            .await
    }

    async fn create_account(
        &self,
        user_id: UserId,
        account: NewOAuthAccount,
    ) -> StorageResult<OAuthAccount> {
        self.blocking(move |db| db.insert_account(user_id, account))
            .await
    }

    async fn update_account_tokens(
        &self,
        account_id: AccountId,
        tokens: &ProviderTokens,
    ) -> StorageResult<OAuthAccount> {
        let tokens = tokens.clone();
        self.blocking(move |db| db.set_account_tokens(account_id, &tokens))
            .await
    }

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let username = username.to_string();
        self.blocking(move |db| db.user_by_username(&username)).await
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email = email.to_string();
        self.blocking(move |db| db.user_by_email(&email)).await
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        self.blocking(move |db| db.insert_user(user)).await
    }

    async fn get_user_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        self.blocking(move |db| db.user_by_id(id)).await
    }

    async fn create_user_with_account(
        &self,
        user: NewUser,
        account: NewOAuthAccount,
    ) -> StorageResult<(User, OAuthAccount)> {
        self.blocking(move |db| db.insert_user_with_account(user, account))
            .await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.blocking(|db| db.check()).await
    }
}
