// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Both functions take the [`AuthGate`] as middleware state and, on success,
//! insert the [`AuthenticatedUser`] into request extensions where the
//! extractors in `extractor.rs` pick it up.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(axum::middleware::from_fn_with_state(gate.clone(), require_auth));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{AuthGate, AuthenticatedUser};

/// Reject the request with 401 unless it carries a valid access token.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    // Never trust an identity that did not come from this gate.
    request.extensions_mut().remove::<AuthenticatedUser>();

    match gate.authenticate(request.headers()) {
        Ok(user) => {
            tracing::Span::current().record("user_id", user.user_id.0);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Attach an identity when a valid access token is present; otherwise let the
/// request through anonymously.
pub async fn optional_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().remove::<AuthenticatedUser>();

    if let Some(user) = gate.try_authenticate(request.headers()) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use crate::auth::TokenManager;
    use crate::config::TokenSettings;
    use crate::models::UserId;

    fn tokens() -> Arc<TokenManager> {
        Arc::new(
            TokenManager::new(&TokenSettings::new(
                "middleware-access-secret-0123456789abcd",
                "middleware-refresh-secret-0123456789abc",
            ))
            .unwrap(),
        )
    }

    fn app(tokens: Arc<TokenManager>) -> Router {
        let gate = AuthGate::new(tokens);
        let required = Router::new()
            .route(
                "/required",
                get(|Extension(user): Extension<AuthenticatedUser>| async move {
                    user.username
                }),
            )
            .route_layer(from_fn_with_state(gate.clone(), require_auth));
        let optional = Router::new()
            .route(
                "/optional",
                get(|user: Option<Extension<AuthenticatedUser>>| async move {
                    user.map(|Extension(u)| u.username)
                        .unwrap_or_else(|| "anonymous".to_string())
                }),
            )
            .route_layer(from_fn_with_state(gate, optional_auth));
        required.merge(optional)
    }

    async fn call(app: Router, uri: &str, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn required_rejects_missing_header() {
        let (status, body) = call(app(tokens()), "/required", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing_auth_header"));
    }

    #[tokio::test]
    async fn required_rejects_wrong_scheme() {
        let (status, body) = call(app(tokens()), "/required", Some("Token abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid_auth_header"));
    }

    #[tokio::test]
    async fn required_accepts_valid_token() {
        let tokens = tokens();
        let token = tokens.generate_access_token(UserId(5), "carol").unwrap();
        let (status, body) = call(
            app(tokens),
            "/required",
            Some(&format!("Bearer {token}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "carol");
    }

    #[tokio::test]
    async fn optional_falls_back_to_anonymous() {
        let tokens = tokens();
        let (status, body) = call(app(tokens.clone()), "/optional", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, body) = call(app(tokens.clone()), "/optional", Some("Bearer junk")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let token = tokens.generate_access_token(UserId(5), "carol").unwrap();
        let (_, body) = call(app(tokens), "/optional", Some(&format!("Bearer {token}"))).await;
        assert_eq!(body, "carol");
    }
}
