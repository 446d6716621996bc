// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth login: redirect to the provider, then link the returning identity.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use serde::Deserialize;

use crate::{
    error::ApiError,
    models::{OAuthResponse, OAuthUser},
    oauth::{OAuthError, Provider, StateSigner},
    state::AppState,
};

const OAUTH_FAILED: &str = "oauth authentication failed";

/// Query string the provider appends when redirecting back.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set instead of `code` when the user denied access.
    #[serde(default)]
    pub error: Option<String>,
}

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid provider"))
}

fn signer(state: &AppState) -> Result<&StateSigner, ApiError> {
    state
        .state_signer
        .as_ref()
        .ok_or_else(|| ApiError::not_found("provider not configured"))
}

/// `GET /v1/auth/oauth/{provider}`
pub async fn begin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&provider)?;
    let signed_state = signer(&state)?.issue(provider).map_err(|err| {
        tracing::error!(%provider, error = %err, "failed to sign oauth state");
        ApiError::internal()
    })?;

    match state.providers.authorize_url(provider, &signed_state) {
        Ok(url) => {
            tracing::debug!(%provider, "redirecting to provider");
            Ok(Redirect::temporary(&url))
        }
        Err(OAuthError::NotConfigured(_)) => Err(ApiError::not_found("provider not configured")),
        Err(err) => {
            tracing::error!(%provider, error = %err, "failed to build authorization url");
            Err(ApiError::internal())
        }
    }
}

/// `GET /v1/auth/oauth/{provider}/callback`
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<OAuthResponse>, ApiError> {
    let provider = parse_provider(&provider)?;
    let signer = signer(&state)?;

    if let Some(reason) = query.error.as_deref() {
        tracing::info!(%provider, reason, "provider reported an authorization error");
        return Err(ApiError::unauthorized(OAUTH_FAILED));
    }
    let (Some(code), Some(signed_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        tracing::debug!(%provider, "callback missing code or state");
        return Err(ApiError::unauthorized(OAUTH_FAILED));
    };

    if let Err(err) = signer.verify(signed_state, provider) {
        tracing::warn!(%provider, error = %err, "rejected oauth state");
        return Err(ApiError::unauthorized(OAUTH_FAILED));
    }

    let identity = state
        .providers
        .complete(provider, code)
        .await
        .map_err(|err| {
            tracing::warn!(%provider, error = %err, "oauth handshake failed");
            ApiError::unauthorized(OAUTH_FAILED)
        })?;

    let linked = state.linker.link(&identity).await?;

    Ok(Json(OAuthResponse {
        message: "oauth authentication successful".to_string(),
        tokens: linked.tokens,
        user: OAuthUser {
            username: linked.user.username,
            email: linked.user.email,
            provider,
        },
    }))
}
