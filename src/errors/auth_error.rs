use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Authentication failures. Rejected before any handler or socket work runs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingAuthHeader,

    #[error("Invalid Authorization header, expected `Bearer <token>`")]
    InvalidAuthHeader,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Authentication misconfigured: {0}")]
    ConfigError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuthHeader | Self::InvalidAuthHeader | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader => "missing_token",
            Self::InvalidAuthHeader => "invalid_auth_header",
            Self::Unauthorized(_) => "unauthorized",
            Self::ConfigError(_) => "auth_config_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Authentication error");
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": "authentication_error",
                "code": self.code(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
