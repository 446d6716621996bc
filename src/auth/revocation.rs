// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process token revocation list.
//!
//! Consulted by the auth gate after a token has been verified. Entries are
//! keyed by the SHA-256 digest of the token so raw tokens are never held in
//! memory, and each entry is dropped once the token would have expired
//! anyway.
//!
//! The list is bounded. When full, the least recently touched entry is
//! evicted and that token becomes usable again until its own expiry. It is
//! not shared between processes.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use lru::LruCache;
use sha2::{Digest, Sha256};

type TokenDigest = [u8; 32];

/// Bounded denylist of revoked tokens.
pub struct RevocationList {
    entries: Mutex<LruCache<TokenDigest, i64>>,
}

impl std::fmt::Debug for RevocationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationList")
            .field("len", &self.len())
            .finish()
    }
}

impl RevocationList {
    /// Create a list holding at most `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Revoke a token until `expires_at` (Unix seconds).
    pub fn revoke(&self, token: &str, expires_at: i64) {
        if expires_at <= Utc::now().timestamp() {
            return;
        }
        if let Some((_, evicted_exp)) = self.entries().push(digest(token), expires_at) {
            if evicted_exp > Utc::now().timestamp() {
                tracing::warn!("revocation list full, evicted a live entry");
            }
        }
    }

    /// Whether a token is currently revoked.
    pub fn is_revoked(&self, token: &str) -> bool {
        let key = digest(token);
        let mut entries = self.entries();
        match entries.get(&key) {
            Some(&exp) if exp > Utc::now().timestamp() => true,
            Some(_) => {
                // Expired
                entries.pop(&key);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poisoning is ignored: every update leaves the cache consistent.
    fn entries(&self) -> MutexGuard<'_, LruCache<TokenDigest, i64>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn revoke_and_check() {
        let list = RevocationList::new(10);
        assert!(!list.is_revoked("token-a"));

        list.revoke("token-a", in_one_hour());
        assert!(list.is_revoked("token-a"));
        assert!(!list.is_revoked("token-b"));
    }

    #[test]
    fn already_expired_tokens_are_not_stored() {
        let list = RevocationList::new(10);
        list.revoke("token-a", Utc::now().timestamp() - 1);
        assert!(list.is_empty());
        assert!(!list.is_revoked("token-a"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let list = RevocationList::new(2);
        list.revoke("token-a", in_one_hour());
        list.revoke("token-b", in_one_hour());
        list.revoke("token-c", in_one_hour());

        assert_eq!(list.len(), 2);
        assert!(!list.is_revoked("token-a"));
        assert!(list.is_revoked("token-b"));
        assert!(list.is_revoked("token-c"));
    }

    #[test]
    fn poisoned_lock_keeps_denying() {
        let list = std::sync::Arc::new(RevocationList::new(10));
        list.revoke("token-a", in_one_hour());

        let holder = list.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("handler crashed while holding the lock");
        })
        .join();
        assert!(panicked.is_err());
        assert!(list.entries.is_poisoned());

        assert!(list.is_revoked("token-a"));
        list.revoke("token-b", in_one_hour());
        assert!(list.is_revoked("token-b"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let list = RevocationList::new(0);
        list.revoke("token-a", in_one_hour());
        assert!(list.is_revoked("token-a"));
    }
}
