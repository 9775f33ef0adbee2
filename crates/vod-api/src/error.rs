//! API error types and the response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {description}")]
    InvalidInput { description: String, params: String },

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {description}")]
    Internal { description: String, params: String },

    #[error("storage error: {0}")]
    Storage(#[from] vod_storage::StorageError),

    #[error("broker error: {0}")]
    Broker(#[from] vod_broker::BrokerError),

    #[error("database error: {0}")]
    Db(#[from] vod_db::DbError),
}

impl ApiError {
    pub fn invalid_input(description: impl Into<String>, params: impl Into<String>) -> Self {
        Self::InvalidInput {
            description: description.into(),
            params: params.into(),
        }
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(description: impl Into<String>, params: impl Into<String>) -> Self {
        Self::Internal {
            description: description.into(),
            params: params.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ApiError::Storage(vod_storage::StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(vod_storage::StorageError::Cancelled)
            | ApiError::Broker(vod_broker::BrokerError::Cancelled)
            | ApiError::Db(vod_db::DbError::Cancelled) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Db(vod_db::DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Db(vod_db::DbError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Internal { .. }
            | ApiError::Storage(_)
            | ApiError::Broker(_)
            | ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "invalid input data",
            StatusCode::UNAUTHORIZED => "unauthenticated",
            StatusCode::NOT_FOUND => "resource not found",
            StatusCode::CONFLICT => "resource already exists",
            StatusCode::REQUEST_TIMEOUT => "request cancelled",
            _ => "internal server error",
        }
    }

    fn body(&self) -> ErrorBody {
        let (description, params) = match self {
            ApiError::InvalidInput {
                description,
                params,
            }
            | ApiError::Internal {
                description,
                params,
            } => (description.clone(), params.clone()),
            ApiError::Unauthenticated(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => (msg.clone(), String::new()),
            other => (other.to_string(), String::new()),
        };

        ErrorBody {
            code: self.status_code().as_u16(),
            message: self.message().to_string(),
            description,
            params,
        }
    }
}

/// Error payload of the response envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub description: String,
    pub params: String,
}

/// Uniform response envelope: `{ok, data, error}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body: Envelope<()> = Envelope {
            ok: false,
            data: None,
            error: Some(self.body()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_on_failure() {
        let err = ApiError::invalid_input("title is required", "user_id: abc");
        let body = err.body();
        assert_eq!(body.code, 400);
        assert_eq!(body.message, "invalid input data");
        assert_eq!(body.description, "title is required");

        let json = serde_json::to_value(Envelope::<()> {
            ok: false,
            data: None,
            error: Some(body),
        })
        .unwrap();
        assert_eq!(json["ok"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], 400);
    }

    #[test]
    fn storage_not_found_maps_to_404() {
        let err = ApiError::from(vod_storage::StorageError::not_found("k"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cancelled_maps_to_request_timeout() {
        let err = ApiError::from(vod_db::DbError::Cancelled);
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn success_envelope_carries_data() {
        let json = serde_json::to_value(Envelope::success(vec![1, 2, 3])).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert!(json["error"].is_null());
    }
}
