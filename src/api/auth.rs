// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential account endpoints: register, login, refresh, logout.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    auth::{
        password::{hash_password, verify_password},
        Auth, AuthGate, TokenPair,
    },
    error::ApiError,
    models::{
        LoginRequest, LoginResponse, LoginUser, LogoutRequest, MessageResponse, NewUser,
        RefreshTokenRequest, RegisterRequest,
    },
    state::AppState,
};

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 20;
const PASSWORD_MIN_CHARS: usize = 8;

const AUTH_FAILED: &str = "authentication failed";
const INVALID_REFRESH: &str = "invalid refresh token";

fn invalid_request(rejection: JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection, "rejected request body");
    ApiError::bad_request("invalid request")
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn validate_registration(request: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = request.username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username_len)
        || request.username.trim() != request.username
    {
        return Err(ApiError::bad_request(format!(
            "username must be {USERNAME_MIN_CHARS}-{USERNAME_MAX_CHARS} characters"
        )));
    }
    if !is_valid_email(&request.email) {
        return Err(ApiError::bad_request("invalid email address"));
    }
    if request.password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ApiError::bad_request(format!(
            "password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }
    Ok(())
}

/// `POST /v1/auth/register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(request) = payload.map_err(invalid_request)?;
    validate_registration(&request)?;

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "password hashing task failed");
            ApiError::internal()
        })?
        .map_err(|err| {
            tracing::error!(error = %err, "password hashing failed");
            ApiError::internal()
        })?;

    let user = state
        .store
        .create_user(NewUser {
            username: request.username,
            email: request.email,
            password_hash: Some(password_hash),
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("user registered successfully")),
    ))
}

/// `POST /v1/auth/login`
///
/// Unknown email, OAuth-only account and wrong password all look the same
/// to the caller.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload.map_err(invalid_request)?;

    let user = match state.store.find_user_by_email(&request.email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(ApiError::unauthorized(AUTH_FAILED)),
        Err(err) => {
            tracing::error!(error = %err, "user lookup failed during login");
            return Err(ApiError::unauthorized(AUTH_FAILED));
        }
    };
    let Some(stored_hash) = user.password_hash.clone() else {
        return Err(ApiError::unauthorized(AUTH_FAILED));
    };

    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "password verification task failed");
            ApiError::unauthorized(AUTH_FAILED)
        })?;
    match verified {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::unauthorized(AUTH_FAILED)),
        Err(err) => {
            tracing::error!(user_id = %user.id, error = %err, "stored password hash unusable");
            return Err(ApiError::unauthorized(AUTH_FAILED));
        }
    }

    let tokens = state
        .tokens
        .generate_token_pair(user.id, &user.username)
        .map_err(|err| {
            tracing::error!(error = %err, "failed to issue tokens on login");
            ApiError::internal()
        })?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        message: "login successful".to_string(),
        tokens,
        user: LoginUser {
            id: user.id,
            username: user.username,
        },
    }))
}

/// `POST /v1/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = payload.map_err(invalid_request)?;

    if state.revocations.is_revoked(&request.refresh_token) {
        tracing::debug!("revoked refresh token presented");
        return Err(ApiError::unauthorized(INVALID_REFRESH));
    }

    state
        .tokens
        .refresh_token_pair(&request.refresh_token)
        .map(Json)
        .map_err(|err| {
            tracing::debug!(reason = err.kind(), "refresh rejected");
            ApiError::unauthorized(INVALID_REFRESH)
        })
}

/// `POST /v1/auth/logout`
///
/// Revokes the access token used for this request. A refresh token in the
/// body is revoked too when it verifies and belongs to the same user.
pub async fn logout(
    State(state): State<AppState>,
    Auth(user): Auth,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice::<LogoutRequest>(&body).map_err(|err| {
            tracing::debug!(error = %err, "rejected logout body");
            ApiError::bad_request("invalid request")
        })?
    };

    let access_token = AuthGate::bearer_token(&headers)
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;
    state.revocations.revoke(access_token, user.claims.exp);

    if let Some(refresh_token) = request.refresh_token.as_deref() {
        match state.tokens.verify_refresh_token(refresh_token) {
            Ok(claims) if claims.user_id == user.user_id => {
                state.revocations.revoke(refresh_token, claims.exp);
            }
            Ok(_) => {
                tracing::warn!(user_id = %user.user_id, "logout with another user's refresh token");
            }
            Err(err) => {
                tracing::debug!(reason = err.kind(), "ignoring unusable refresh token on logout");
            }
        }
    }

    tracing::info!(user_id = %user.user_id, "user logged out");
    Ok(Json(MessageResponse::new("logout successful")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    fn registration(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn registration_validation_rules() {
        assert!(validate_registration(&registration("alice", "a@b.io", "password1")).is_ok());
        assert!(validate_registration(&registration("al", "a@b.io", "password1")).is_err());
        assert!(
            validate_registration(&registration(&"a".repeat(21), "a@b.io", "password1")).is_err()
        );
        assert!(validate_registration(&registration("alice", "not-an-email", "password1")).is_err());
        assert!(validate_registration(&registration("alice", "@b.io", "password1")).is_err());
        assert!(validate_registration(&registration("alice", "a@b.io", "short")).is_err());
    }

    #[tokio::test]
    async fn register_then_login() {
        let state = test_state();

        let (status, Json(body)) = register(
            State(state.clone()),
            Ok(Json(registration("alice", "alice@example.com", "hunter2hunter2"))),
        )
        .await
        .expect("registration succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.message, "user registered successfully");

        let Json(login) = login(
            State(state.clone()),
            Ok(Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })),
        )
        .await
        .expect("login succeeds");
        assert_eq!(login.user.username, "alice");

        let claims = state
            .tokens
            .verify_access_token(&login.tokens.access_token)
            .unwrap();
        assert_eq!(claims.user_id, login.user.id);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let state = test_state();
        register(
            State(state.clone()),
            Ok(Json(registration("bob", "bob@example.com", "password123"))),
        )
        .await
        .unwrap();

        let err = register(
            State(state),
            Ok(Json(registration("bob", "other@example.com", "password123"))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_alike() {
        let state = test_state();
        register(
            State(state.clone()),
            Ok(Json(registration("carol", "carol@example.com", "password123"))),
        )
        .await
        .unwrap();

        let wrong = login(
            State(state.clone()),
            Ok(Json(LoginRequest {
                email: "carol@example.com".to_string(),
                password: "not-the-password".to_string(),
            })),
        )
        .await
        .unwrap_err();
        let unknown = login(
            State(state),
            Ok(Json(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "password123".to_string(),
            })),
        )
        .await
        .unwrap_err();

        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.message, unknown.message);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_revoked_tokens() {
        let state = test_state();
        let pair = state
            .tokens
            .generate_token_pair(crate::models::UserId(1), "alice")
            .unwrap();

        let err = refresh(
            State(state.clone()),
            Ok(Json(RefreshTokenRequest {
                refresh_token: pair.access_token.clone(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.message, INVALID_REFRESH);

        let Json(rotated) = refresh(
            State(state.clone()),
            Ok(Json(RefreshTokenRequest {
                refresh_token: pair.refresh_token.clone(),
            })),
        )
        .await
        .expect("valid refresh token");
        assert!(state.tokens.verify_access_token(&rotated.access_token).is_ok());

        state.revocations.revoke(&pair.refresh_token, i64::MAX);
        let err = refresh(
            State(state),
            Ok(Json(RefreshTokenRequest {
                refresh_token: pair.refresh_token,
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
