use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::vendor::VendorError;

/// Errors returned by HTTP handlers before or instead of a protocol takeover.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Model `{0}` is not supported")]
    UnsupportedModel(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("Vendor task finished without producing audio")]
    EmptyAudio,

    #[error("{dropped} audio frames were lost before they could be collected")]
    AudioIncomplete { dropped: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedModel(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Vendor(VendorError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Vendor(VendorError::MissingCredentials) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Vendor(_) | Self::EmptyAudio | Self::AudioIncomplete { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::UnsupportedModel(_) | Self::BadRequest(_) => "invalid_request_error",
            Self::Vendor(_) | Self::EmptyAudio | Self::AudioIncomplete { .. } => {
                "vendor_error"
            }
            Self::Internal(_) => "server_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::BadRequest(_) => "invalid_request",
            Self::Vendor(e) => e.code(),
            Self::EmptyAudio => "empty_audio",
            Self::AudioIncomplete { .. } => "audio_incomplete",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.code(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_status_mapping() {
        assert_eq!(
            AppError::Vendor(VendorError::Timeout("late".into())).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::Vendor(VendorError::MissingCredentials).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Vendor(VendorError::Connection("refused".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::EmptyAudio.status_code(), StatusCode::BAD_GATEWAY);

        let incomplete = AppError::AudioIncomplete { dropped: 3 };
        assert_eq!(incomplete.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(incomplete.code(), "audio_incomplete");
    }

    #[test]
    fn test_unsupported_model() {
        let err = AppError::UnsupportedModel("whisper-1".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "unsupported_model");
        assert_eq!(err.to_string(), "Model `whisper-1` is not supported");
    }
}
