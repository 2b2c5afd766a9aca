//! Application error types.

use agentage_core::accounts::LinkError;
use agentage_core::auth::{GateRejection, TokenError};
use agentage_core::device::{DeviceFlowError, ProtocolError, ProtocolErrorCode};
use agentage_core::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;
use crate::services::oauth::OAuthError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    /// RFC 8628 error, rendered as `{error, error_description}`.
    #[error("{error}")]
    Protocol {
        status: StatusCode,
        error: ProtocolError,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Separate from `Unauthorized` so clients can prompt a fresh login.
    #[error("Token expired")]
    TokenExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn protocol(status: StatusCode, error: ProtocolError) -> Self {
        AppError::Protocol { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Protocol { status, error } => {
                return (status, Json(error)).into_response();
            }
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "token_expired",
                "Token has expired, please log in again".to_string(),
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m),
            AppError::Upstream(m) => (StatusCode::BAD_GATEWAY, "upstream_error", m),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<ProtocolError> for AppError {
    fn from(e: ProtocolError) -> Self {
        let status = match e.error {
            ProtocolErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        AppError::protocol(status, e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => AppError::NotFound(m),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<GateRejection> for AppError {
    fn from(e: GateRejection) -> Self {
        match e {
            GateRejection::ExpiredToken => AppError::TokenExpired,
            GateRejection::MissingToken
            | GateRejection::InvalidToken
            | GateRejection::UserNotFound => AppError::Unauthorized(e.to_string()),
            GateRejection::Inactive | GateRejection::Forbidden => {
                AppError::Forbidden(e.to_string())
            }
            GateRejection::Store(e) => AppError::from(e),
        }
    }
}

impl From<LinkError> for AppError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::ProviderConflict => AppError::Conflict(e.to_string()),
            LinkError::AlreadyLinked
            | LinkError::NotLinked
            | LinkError::LastProvider
            | LinkError::Validation(_) => AppError::Validation(e.to_string()),
            LinkError::UserNotFound => AppError::NotFound(e.to_string()),
            LinkError::Store(e) => AppError::from(e),
        }
    }
}

impl From<DeviceFlowError> for AppError {
    fn from(e: DeviceFlowError) -> Self {
        match e {
            DeviceFlowError::Protocol(p) => AppError::from(p),
            DeviceFlowError::UserNotFound(_) => {
                AppError::from(ProtocolError::invalid_grant("User account no longer exists"))
            }
            DeviceFlowError::Store(e) => AppError::from(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::NotConfigured(_) => AppError::NotFound(e.to_string()),
            OAuthError::InvalidCallback(_) | OAuthError::InvalidState | OAuthError::Profile(_) => {
                AppError::Validation(e.to_string())
            }
            OAuthError::Exchange(_) | OAuthError::Http(_) => AppError::Upstream(e.to_string()),
            OAuthError::Url(_) => AppError::Internal(e.to_string()),
        }
    }
}

/// Failures while assembling [`AppState`](crate::AppState).
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Device(#[from] DeviceFlowError),

    #[error("HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
