// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    auth::{Auth, OptionalAuth},
    error::ApiError,
    models::{User, UserId},
    state::AppState,
};

/// Response for GET /v1/users/me
#[derive(Debug, Serialize)]
pub struct UserMeResponse {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserMeResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

/// Response for GET /v1/users/whoami
#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Get the stored profile of the authenticated user.
///
/// A valid token for a user that no longer exists yields 404.
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<UserMeResponse>, ApiError> {
    let stored = state
        .store
        .get_user_by_id(user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(stored.into()))
}

pub async fn whoami(OptionalAuth(user): OptionalAuth) -> Json<WhoAmIResponse> {
    Json(match user {
        Some(user) => WhoAmIResponse {
            authenticated: true,
            user_id: Some(user.user_id),
            username: Some(user.username),
        },
        None => WhoAmIResponse {
            authenticated: false,
            user_id: None,
            username: None,
        },
    })
}
