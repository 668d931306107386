use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the external AI collaborator.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request timed out")]
    Timeout,

    /// Network failure, quota, or a non-2xx answer.
    #[error("analysis provider failed: {0}")]
    Transient(String),

    /// The provider answered with something that is not JSON at all.
    #[error("analysis response is not JSON: {0}")]
    Malformed(String),

    #[error("analysis provider is not available")]
    Unavailable,
}

/// Failures of the durable meal/profile store.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The store acknowledged a create but the record cannot be read back.
    #[error("meal {0} was acknowledged by the store but cannot be read back")]
    GhostWrite(Uuid),

    #[error("meal {0} not found")]
    NotFound(Uuid),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// User input rejected before anything is scheduled or written.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("food name must not be empty")]
    EmptyName,

    #[error("{field} must be a positive number")]
    NotPositive { field: &'static str },

    #[error("budget must be between {min} and {max}, got {value}")]
    BudgetOutOfRange { value: i64, min: i64, max: i64 },

    #[error("unknown sugar type: {0}")]
    UnknownSugarType(String),

    #[error("unknown food: {0}")]
    UnknownFood(String),

    #[error("product {0} has no nutrition data")]
    MissingNutriments(String),

    #[error("invalid image payload")]
    InvalidImage,

    #[error("feedback must not be empty")]
    EmptyFeedback,
}

/// Error surface of the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("not found")]
    NotFound,

    /// The resource exists but is in a state that forbids the request.
    #[error("{0}")]
    Conflict(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Repo(RepoError::NotFound(_)) | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Repo(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Analysis(AnalysisError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Analysis(AnalysisError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Analysis(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Repo(RepoError::GhostWrite(_)) => "ghost_write",
            Self::Repo(RepoError::NotFound(_)) | Self::NotFound => "not_found",
            Self::Repo(RepoError::Persistence(_)) => "persistence",
            Self::Analysis(_) => "analysis",
            Self::Storage(_) => "storage",
            Self::Conflict(_) => "conflict",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        }
        let body = Json(json!({ "error": self.kind(), "message": self.to_string() }));
        (status, body).into_response()
    }
}
