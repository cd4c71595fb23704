use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::models::CanonicalResponse;

// Every way a request can end before a handler produces a body
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Too many requests, please try again later")]
    RateLimited,
    #[error("Missing commentId or url parameter")]
    MissingParameter,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Upstream request failed: {0}")]
    Upstream(String),
    #[error("Upstream request timed out")]
    UpstreamTimeout,
}

// Error body shared by every structured failure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: u16,
    pub success: bool,
    pub error_message: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingParameter | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn into_response(self) -> CanonicalResponse {
        let status = self.status();

        // 404 keeps its own shape for compatibility with existing clients
        if let Self::NotFound = self {
            return CanonicalResponse::json(status, &serde_json::json!({ "message": "Not found" }));
        }

        let body = ErrorBody {
            error_code: status.as_u16(),
            success: false,
            error_message: self.to_string(),
        };
        CanonicalResponse::json(status, &body)
    }
}
