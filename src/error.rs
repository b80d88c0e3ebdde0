use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::response::ApiJson;

/// Every way a request can fail. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    /// Unknown email and wrong password share this variant on purpose.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Missing or invalid authorization header")]
    MissingBearer,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("User with this email already exists")]
    EmailTaken,

    #[error("token signing secret is not configured")]
    Configuration,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    TokenIssue(#[from] jsonwebtoken::errors::Error),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::MissingBearer | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::Configuration
            | AuthError::Hashing(_)
            | AuthError::TokenIssue(_)
            | AuthError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text sent to the client. Server-side failures never expose their cause.
    fn public_message(&self) -> String {
        match self {
            AuthError::Configuration => "Internal server error".into(),
            AuthError::Hashing(_) => "Failed to process password".into(),
            AuthError::TokenIssue(_) => "Failed to generate token".into(),
            AuthError::Store { context, .. } => (*context).into(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.public_message(),
        };
        ApiJson(status, body).into_response()
    }
}
