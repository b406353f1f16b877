use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::auth::AuthError;
use crate::models::auth::ErrorResponse;
use crate::store::StoreError;
use crate::tutoring_client::DirectoryError;

/// Failure taxonomy shared by the socket gateway and the HTTP surface.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("caller is not a participant of this conversation")]
    Authorization,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl ChatError {
    /// Text safe to show to the client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Authentication(_) => "Authentication required".to_string(),
            ChatError::Authorization => {
                "You do not have permission to access this conversation".to_string()
            }
            ChatError::Validation(message) => message.clone(),
            ChatError::NotFound(what) => format!("{} not found", what),
            ChatError::Dependency(_) => "Service temporarily unavailable, please retry".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Dependency(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Authorization => StatusCode::FORBIDDEN,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Dependency(format!("message store: {}", err))
    }
}

impl From<DirectoryError> for ChatError {
    fn from(err: DirectoryError) -> Self {
        ChatError::Dependency(format!("tutoring service: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ChatError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ChatError::Dependency("operation timed out".to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                success: false,
                message: self.client_message(),
            }),
        )
            .into_response()
    }
}
