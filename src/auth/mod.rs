// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Local JWT authentication for the CTFLab API.
//!
//! ## Auth Flow
//!
//! 1. A user logs in with credentials or completes an OAuth callback
//! 2. [`TokenManager`] issues an access/refresh pair
//! 3. Clients send `Authorization: Bearer <access token>`
//! 4. [`AuthGate`]:
//!    - Rejects any non-HMAC `alg`
//!    - Verifies signature against the access secret, then expiry, then claims
//!    - Consults the [`RevocationList`]
//!    - Attaches an [`AuthenticatedUser`] to the request
//! 5. `POST /v1/auth/refresh` exchanges a refresh token for a new pair
//!
//! ## Security
//!
//! - Access and refresh tokens use distinct secrets
//! - No clock skew tolerance unless `JWT_LEEWAY_SECONDS` is set
//! - Rejections share one public error code apart from missing header,
//!   bad header and expiry
//! - Secrets and tokens are never logged

pub mod claims;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod token;

pub use claims::{AuthenticatedUser, Claims, IdentityLookup};
pub use error::AuthError;
pub use extractor::{Auth, OptionalAuth};
pub use gate::AuthGate;
pub use middleware::{optional_auth, require_auth};
pub use revocation::RevocationList;
pub use token::{TokenError, TokenKind, TokenManager, TokenPair};
