use std::any::Any;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use strum_macros::{AsRefStr, Display, EnumIter};
use thiserror::Error;
use tracing::{error, warn};

/// Category of a failure, reported to clients in the `error` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
pub enum ErrorKind {
    #[strum(serialize = "validation error")]
    Validation,
    #[strum(serialize = "authentication error")]
    Authentication,
    #[strum(serialize = "authorization error")]
    Authorization,
    #[strum(serialize = "resource not found")]
    NotFound,
    #[strum(serialize = "duplicate entry")]
    DuplicateEntry,
    #[strum(serialize = "database error")]
    Database,
    #[strum(serialize = "internal server error")]
    Internal,
    #[strum(serialize = "invalid input")]
    InvalidInput,
    #[strum(serialize = "external service error")]
    ExternalService,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DuplicateEntry => StatusCode::CONFLICT,
            ErrorKind::Database | ErrorKind::Internal | ErrorKind::ExternalService => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Application error. The message of every variant is safe to show to a client;
/// `cause` carries the underlying failure and is only ever logged.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {message} ({cause})")]
    Database { message: String, cause: String },

    #[error("Internal server error: {message} ({cause})")]
    Internal { message: String, cause: String },

    #[error("External service error: {message} ({cause})")]
    ExternalService { message: String, cause: String },
}

impl AppError {
    pub fn database(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Database {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Authentication(_) => ErrorKind::Authentication,
            AppError::Authorization(_) => ErrorKind::Authorization,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::DuplicateEntry(_) => ErrorKind::DuplicateEntry,
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::Database { .. } => ErrorKind::Database,
            AppError::Internal { .. } => ErrorKind::Internal,
            AppError::ExternalService { .. } => ErrorKind::ExternalService,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Message returned to the client
    pub fn public_message(&self) -> &str {
        match self {
            AppError::Validation(msg)
            | AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::DuplicateEntry(msg)
            | AppError::InvalidInput(msg) => msg,
            AppError::Database { message, .. }
            | AppError::Internal { message, .. }
            | AppError::ExternalService { message, .. } => message,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected request body");
        AppError::Validation("Invalid request data".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        match kind {
            ErrorKind::Database | ErrorKind::Internal | ErrorKind::ExternalService => {
                error!(error_kind = %kind, error = %self, "Request failed")
            }
            _ => warn!(error_kind = %kind, error = %self, "Request rejected"),
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
            "error": kind.to_string(),
        }));

        (kind.status_code(), body).into_response()
    }
}

/// Converts a panic raised while handling a request into a generic 500 response.
/// Installed through `CatchPanicLayer::custom`.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    // Location and backtrace are printed by the default panic hook
    error!(panic = %detail, "Recovered from panic while handling request");

    AppError::internal("An unexpected error occurred", detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[rstest]
    #[case(AppError::Validation("bad".into()), StatusCode::BAD_REQUEST)]
    #[case(AppError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST)]
    #[case(AppError::Authentication("who".into()), StatusCode::UNAUTHORIZED)]
    #[case(AppError::Authorization("no".into()), StatusCode::FORBIDDEN)]
    #[case(AppError::NotFound("gone".into()), StatusCode::NOT_FOUND)]
    #[case(AppError::DuplicateEntry("twice".into()), StatusCode::CONFLICT)]
    #[case(AppError::database("db", "boom"), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(AppError::internal("oops", "boom"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_code_per_kind(#[case] error: AppError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn test_every_kind_has_a_wire_name() {
        for kind in ErrorKind::iter() {
            assert!(!kind.to_string().is_empty());
        }
        assert_eq!(ErrorKind::NotFound.to_string(), "resource not found");
        assert_eq!(ErrorKind::InvalidInput.as_ref(), "invalid input");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::NotFound("Template not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Template not found");
        assert_eq!(body["error"], "resource not found");
    }

    #[tokio::test]
    async fn test_cause_is_not_exposed() {
        let response =
            AppError::database("Failed to create template", "relation \"templates\" does not exist")
                .into_response();

        let body = body_json(response).await;
        assert_eq!(body["message"], "Failed to create template");
        assert!(!body.to_string().contains("relation"));
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let response = handle_panic(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "internal server error");
        assert!(!body.to_string().contains("index out of bounds"));
    }
}
