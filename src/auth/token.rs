// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Manager
//!
//! Issues and verifies the access/refresh pair.
//!
//! ## Secrets
//!
//! Access and refresh tokens are signed with two distinct HMAC secrets. A
//! refresh token therefore never verifies as an access token and vice versa,
//! and a leaked access secret cannot mint refresh tokens.
//!
//! ## Verification Order
//!
//! 1. Header is decoded and its `alg` must belong to the HMAC family. `none`
//!    and every asymmetric algorithm are rejected before any key is touched.
//! 2. Signature is checked against the secret for the expected token kind.
//! 3. Expiry is checked: a token is valid iff `now < exp` (plus configured
//!    leeway, zero by default).
//! 4. Claims are checked for structural validity (issuer, username).

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};

use super::Claims;
use crate::config::{ConfigError, TokenSettings};
use crate::models::UserId;

/// Algorithm used when signing.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Algorithms accepted when verifying.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Which secret a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Access and refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Token verification and signing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not a parseable JWT.
    #[error("token is malformed")]
    TokenInvalid,

    #[error("token has expired")]
    TokenExpired,

    /// Wrong secret, tampered token, or a non-HMAC `alg`.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// Signature verified but the claim set is unusable.
    #[error("token claims are invalid")]
    ClaimsInvalid,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::TokenInvalid => "token_invalid",
            TokenError::TokenExpired => "token_expired",
            TokenError::SignatureInvalid => "signature_invalid",
            TokenError::ClaimsInvalid => "claims_invalid",
            TokenError::Signing(_) => "signing_failed",
        }
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Just enough of the JOSE header to check `alg` before handing the token to
/// `jsonwebtoken`, which cannot represent `none`.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Issues and verifies access/refresh token pairs.
///
/// Immutable after construction and safe to share across threads.
pub struct TokenManager {
    access: Keys,
    refresh: Keys,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
    leeway: i64,
    validation: Validation,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Build a manager, refusing unsafe settings.
    ///
    /// Fails if either secret is empty, the secrets are equal, or the refresh
    /// lifetime does not exceed the access lifetime.
    pub fn new(settings: &TokenSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        // Expiry is checked by hand so that `now == exp` is already expired.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Ok(Self {
            access: Keys::from_secret(&settings.access_secret),
            refresh: Keys::from_secret(&settings.refresh_secret),
            issuer: settings.issuer.clone(),
            access_ttl: duration_secs(settings.access_ttl),
            refresh_ttl: duration_secs(settings.refresh_ttl),
            leeway: duration_secs(settings.leeway),
            validation,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Access token lifetime in seconds.
    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_ttl
    }

    /// Issue a fresh access/refresh pair for a user.
    pub fn generate_token_pair(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now().timestamp();
        let access_token = self.sign(TokenKind::Access, user_id, username, now)?;
        let refresh_token = self.sign(TokenKind::Refresh, user_id, username, now)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl,
        })
    }

    /// Issue a lone access token.
    pub fn generate_access_token(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<String, TokenError> {
        self.sign(TokenKind::Access, user_id, username, Utc::now().timestamp())
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh)
    }

    /// Exchange a valid refresh token for a brand new pair.
    ///
    /// Claims are copied from the verified refresh token; nothing else is
    /// consulted. The presented token stays valid until its own expiry.
    pub fn refresh_token_pair(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.verify_refresh_token(refresh_token)?;
        self.generate_token_pair(claims.user_id, &claims.username)
    }

    /// Whether an access token failed verification only because it expired.
    ///
    /// Malformed or forged tokens are not "expired", they are invalid. So is
    /// anything signed with the refresh secret.
    pub fn is_token_expired(&self, token: &str) -> bool {
        self.verify_access_token(token) == Err(TokenError::TokenExpired)
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn lifetime(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn sign(
        &self,
        kind: TokenKind,
        user_id: UserId,
        username: &str,
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(user_id, username, &self.issuer, now, self.lifetime(kind));
        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        check_algorithm(token)?;

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(classify)?;
        let claims = data.claims;

        if claims.is_expired_at(Utc::now().timestamp(), self.leeway) {
            return Err(TokenError::TokenExpired);
        }
        if !claims.is_well_formed(&self.issuer) {
            return Err(TokenError::ClaimsInvalid);
        }
        Ok(claims)
    }
}

/// Reject anything that is not a three-segment JWS with an HMAC `alg`.
fn check_algorithm(token: &str) -> Result<(), TokenError> {
    let header_segment = token.split('.').next().unwrap_or_default();
    if token.split('.').count() != 3 || header_segment.is_empty() {
        return Err(TokenError::TokenInvalid);
    }

    let bytes =
        Base64UrlUnpadded::decode_vec(header_segment).map_err(|_| TokenError::TokenInvalid)?;
    let raw: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::TokenInvalid)?;

    let accepted = raw
        .alg
        .parse::<Algorithm>()
        .is_ok_and(|alg| ACCEPTED_ALGORITHMS.contains(&alg));
    if !accepted {
        return Err(TokenError::SignatureInvalid);
    }

    decode_header(token).map_err(|_| TokenError::TokenInvalid)?;
    Ok(())
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenError::TokenExpired,
        // The payload is only parsed after the signature has been verified.
        ErrorKind::Json(_)
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::ImmatureSignature => TokenError::ClaimsInvalid,
        _ => TokenError::TokenInvalid,
    }
}

fn duration_secs(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
