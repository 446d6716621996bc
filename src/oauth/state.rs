// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stateless, signed OAuth `state` parameter.
//!
//! Format: `base64url(json payload) "." base64url(HMAC-SHA256(payload segment))`.
//! The payload binds the provider, an expiry and a random nonce, so a state
//! issued for one provider cannot be replayed against another and stops
//! working after [`STATE_LIFETIME_SECS`].

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{OAuthError, Provider};

type HmacSha256 = Hmac<Sha256>;

/// How long a handshake may take.
pub const STATE_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
struct StatePayload {
    provider: Provider,
    exp: i64,
    nonce: String,
}

/// Issues and verifies `state` values.
#[derive(Clone)]
pub struct StateSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner").finish_non_exhaustive()
    }
}

impl StateSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    pub fn issue(&self, provider: Provider) -> Result<String, OAuthError> {
        self.issue_at(provider, Utc::now().timestamp())
    }

    pub fn verify(&self, state: &str, provider: Provider) -> Result<(), OAuthError> {
        self.verify_at(state, provider, Utc::now().timestamp())
    }

    fn issue_at(&self, provider: Provider, now: i64) -> Result<String, OAuthError> {
        let payload = StatePayload {
            provider,
            exp: now + STATE_LIFETIME_SECS,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        };
        let json = serde_json::to_vec(&payload).map_err(|_| OAuthError::InvalidState("encode"))?;
        let body = Base64UrlUnpadded::encode_string(&json);

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{body}.{signature}"))
    }

    fn verify_at(&self, state: &str, provider: Provider, now: i64) -> Result<(), OAuthError> {
        let (body, signature) = state
            .split_once('.')
            .ok_or(OAuthError::InvalidState("format"))?;
        let signature = Base64UrlUnpadded::decode_vec(signature)
            .map_err(|_| OAuthError::InvalidState("format"))?;

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| OAuthError::InvalidState("signature"))?;

        let json =
            Base64UrlUnpadded::decode_vec(body).map_err(|_| OAuthError::InvalidState("format"))?;
        let payload: StatePayload =
            serde_json::from_slice(&json).map_err(|_| OAuthError::InvalidState("format"))?;

        if payload.provider != provider {
            return Err(OAuthError::InvalidState("provider"));
        }
        if now >= payload.exp {
            return Err(OAuthError::InvalidState("expired"));
        }
        Ok(())
    }

    fn mac(&self) -> Result<HmacSha256, OAuthError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key).map_err(|_| OAuthError::InvalidState("key"))
    }
}
