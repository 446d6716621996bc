// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CTFLab Server - Identity & Token Service
//!
//! Issues and verifies JWT access/refresh pairs signed with two independent
//! secrets, and links external OAuth identities (GitHub, Google) to local
//! accounts stored in an embedded redb database.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers and router (Axum)
//! - `auth` - Token manager, auth gate, middleware and extractors
//! - `identity` - Linking provider identities to local users
//! - `oauth` - Provider handshake and signed `state` values
//! - `storage` - Identity records on redb

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod oauth;
pub mod state;
pub mod storage;
