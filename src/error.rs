// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::identity::LinkError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 500 with a generic message. Log the cause before calling.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { entity } => ApiError::conflict(format!("{entity} already exists")),
            other => {
                tracing::error!(error = %other, "storage failure");
                ApiError::internal()
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::IdentityConflict { .. } => {
                tracing::warn!(error = %err, "identity link gave up after repeated conflicts");
                ApiError::conflict("identity is being linked concurrently, retry")
            }
            LinkError::UsernameTaken(_) => {
                ApiError::conflict("username is already taken by another account")
            }
            LinkError::InvalidIdentity => {
                ApiError::bad_request("provider did not return a usable identity")
            }
            LinkError::Storage(_) | LinkError::Token(_) => {
                tracing::error!(error = %err, "failed to process oauth user");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    use crate::oauth::Provider;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let unauth = ApiError::unauthorized("nope");
        assert_eq!(unauth.status, StatusCode::UNAUTHORIZED);

        let conflict = ApiError::conflict("dup");
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        assert_eq!(ApiError::internal().status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn link_errors_map_to_statuses() {
        let conflict = ApiError::from(LinkError::IdentityConflict {
            provider: Provider::GitHub,
            provider_user_id: "42".to_string(),
        });
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let taken = ApiError::from(LinkError::UsernameTaken("alice".to_string()));
        assert_eq!(taken.status, StatusCode::CONFLICT);

        let invalid = ApiError::from(LinkError::InvalidIdentity);
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let storage = ApiError::from(LinkError::Storage(StorageError::Task("boom".to_string())));
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!storage.message.contains("boom"));
    }

    #[test]
    fn storage_conflict_is_409() {
        let err = ApiError::from(StorageError::Conflict { entity: "username" });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "username already exists");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
