// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{optional_auth, require_auth},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod oauth;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let gate = state.gate.clone();

    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/oauth/{provider}", get(oauth::begin))
        .route("/auth/oauth/{provider}/callback", get(oauth::callback));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::get_current_user))
        .route_layer(from_fn_with_state(gate.clone(), require_auth));

    let optional = Router::new()
        .route("/users/whoami", get(users::whoami))
        .route_layer(from_fn_with_state(gate, optional_auth));

    let v1_routes = public.merge(protected).merge(optional);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id,
                        user_id = tracing::field::Empty,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::to_bytes,
        http::{header, Method, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::test_support::test_state;

    fn app() -> Router {
        router(test_state().with_provider_client(Arc::new(oauth::tests::FakeProviders)))
    }

    fn json_request(method: Method, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Register and log in `alice`; returns the login response body.
    async fn login_alice(app: &Router) -> Value {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1/auth/register",
                json!({"username": "alice", "email": "alice@example.com", "password": "wonderland"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1/auth/login",
                json!({"email": "alice@example.com", "password": "wonderland"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let app = app();
        for uri in ["/health", "/health/live", "/health/ready"] {
            let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let response = app()
            .oneshot(get_request("/health/live", None))
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn register_login_and_fetch_profile() {
        let app = app();
        let login = login_alice(&app).await;
        assert_eq!(login["message"], "login successful");
        assert_eq!(login["user"]["username"], "alice");
        let access = login["access_token"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/v1/users/me", Some(access)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["username"], "alice");
        assert_eq!(me["email"], "alice@example.com");
        assert_eq!(me["user_id"], login["user"]["id"]);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let response = app()
            .oneshot(get_request("/v1/users/me", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn refresh_tokens_are_not_access_tokens() {
        let app = app();
        let login = login_alice(&app).await;
        let refresh = login["refresh_token"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/v1/users/me", Some(refresh)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error_code"], "invalid_token");

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/v1/auth/refresh",
                json!({"refresh_token": refresh}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let pair = body_json(response).await;
        assert!(pair["access_token"].is_string());
        assert!(pair["expires_in"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn logout_revokes_access_and_refresh_tokens() {
        let app = app();
        let login = login_alice(&app).await;
        let access = login["access_token"].as_str().unwrap();
        let refresh = login["refresh_token"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1/auth/logout",
                json!({"refresh_token": refresh}),
                Some(access),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "logout successful");

        let response = app
            .clone()
            .oneshot(get_request("/v1/users/me", Some(access)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error_code"], "invalid_token");

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/v1/auth/refresh",
                json!({"refresh_token": refresh}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid refresh token");
    }

    #[tokio::test]
    async fn logout_without_body_is_accepted() {
        let app = app();
        let login = login_alice(&app).await;
        let access = login["access_token"].as_str().unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn whoami_works_with_and_without_token() {
        let app = app();
        let response = app
            .clone()
            .oneshot(get_request("/v1/users/whoami", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"authenticated": false}));

        let response = app
            .clone()
            .oneshot(get_request("/v1/users/whoami", Some("garbage")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["authenticated"], false);

        let login = login_alice(&app).await;
        let access = login["access_token"].as_str().unwrap();
        let response = app
            .oneshot(get_request("/v1/users/whoami", Some(access)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["username"], "alice");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid request");
    }

    #[tokio::test]
    async fn oauth_begin_redirects_and_rejects_unknown_provider() {
        let app = app();
        let response = app
            .clone()
            .oneshot(get_request("/v1/auth/oauth/github", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let response = app
            .oneshot(get_request("/v1/auth/oauth/myspace", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid provider");
    }

    #[tokio::test]
    async fn oauth_callback_without_state_is_unauthorized() {
        let response = app()
            .oneshot(get_request("/v1/auth/oauth/github/callback?code=good", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "oauth authentication failed");
    }
}
