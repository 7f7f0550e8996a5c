use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Failures of the authentication flow. Each maps to one HTTP status.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("OAuth code exchange failed: {0}")]
    OAuthExchange(String),

    #[error("fetching the provider profile failed: {0}")]
    ProfileFetch(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or malformed Authorization header")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("user not found")]
    UserNotFound,

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("token signing failed: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    error: bool,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::Conflict(_)
            | AuthError::InvalidOAuthState
            | AuthError::OAuthExchange(_)
            | AuthError::ProfileFetch(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Storage(_) | AuthError::TokenSigning(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to clients. Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AuthError::OAuthExchange(_) => "Error with OAuth exchange".into(),
            AuthError::ProfileFetch(_) => "Error fetching user info from provider".into(),
            AuthError::Storage(_) => "Could not access user storage".into(),
            AuthError::TokenSigning(_) => "Could not issue session token".into(),
            AuthError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "rejected request body");
        AuthError::Validation("Invalid request".into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = Json(ErrorBody {
            message: self.public_message(),
            error: true,
        });
        (status, body).into_response()
    }
}
