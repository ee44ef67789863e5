//! Domain-level error type and its conversion to the HTTP envelope and to
//! WebSocket close codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quiz_protocol::HttpErrorEnvelope;
use std::fmt::Display;

pub type HttpResult<T = ()> = Result<T, Response>;

/// Everything the session engine's pure logic can go wrong in. HTTP
/// handlers and the WS dispatcher both convert into their own transport at
/// the edge; this enum carries no transport concerns itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        match self {
            EngineError::Validation(msg) => bad_request(msg),
            EngineError::NotFound(msg) => not_found(msg),
            EngineError::Conflict(msg) => conflict(msg),
            EngineError::Unauthorized(msg) => unauthorized(msg),
            EngineError::Forbidden(msg) => forbidden(msg),
            EngineError::Database(err) => internal_error(err),
            EngineError::Internal(msg) => internal_error(msg),
        }
    }
}

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn conflict(message: impl Into<String>) -> Response {
    json_error(StatusCode::CONFLICT, "CONFLICT", message)
}

pub fn unauthorized(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

pub fn forbidden(message: impl Into<String>) -> Response {
    json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(
        response: Response,
        expected_status: StatusCode,
        expected_code: &str,
        expected_message: &str,
    ) {
        assert_eq!(response.status(), expected_status);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");
        assert_eq!(parsed.code, expected_code);
        assert_eq!(parsed.message, expected_message);
        assert_eq!(parsed.details, None);
    }

    #[tokio::test]
    async fn engine_error_validation_maps_to_bad_request() {
        let err = EngineError::Validation("nickname too short".to_owned());
        assert_error_response(
            err.into_response(),
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "nickname too short",
        )
        .await;
    }

    #[tokio::test]
    async fn engine_error_conflict_maps_to_conflict() {
        let err = EngineError::Conflict("nickname already taken".to_owned());
        assert_error_response(
            err.into_response(),
            StatusCode::CONFLICT,
            "CONFLICT",
            "nickname already taken",
        )
        .await;
    }

    #[tokio::test]
    async fn engine_error_forbidden_maps_to_forbidden() {
        let err = EngineError::Forbidden("not the session owner".to_owned());
        assert_error_response(
            err.into_response(),
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "not the session owner",
        )
        .await;
    }
}
