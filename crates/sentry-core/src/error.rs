use thiserror::Error;

/// Machine-readable error kind surfaced in the `{"error": "<kind>", ...}` envelope.
///
/// Mirrors the fixed vocabulary the transport layer maps to HTTP status codes;
/// never add a variant here without also deciding its status mapping at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingAuth,
    InvalidAuth,
    ProjectMismatch,
    ParseFailed,
    DecompressionFailed,
    ProjectNotFound,
    IssueNotFound,
    EventNotFound,
    MissingFields,
    NoUpdates,
    Forbidden,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingAuth => "missing_auth",
            ErrorKind::InvalidAuth => "invalid_auth",
            ErrorKind::ProjectMismatch => "project_mismatch",
            ErrorKind::ParseFailed => "parse_failed",
            ErrorKind::DecompressionFailed => "decompression_failed",
            ErrorKind::ProjectNotFound => "project_not_found",
            ErrorKind::IssueNotFound => "issue_not_found",
            ErrorKind::EventNotFound => "event_not_found",
            ErrorKind::MissingFields => "missing_fields",
            ErrorKind::NoUpdates => "no_updates",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("missing auth")]
    MissingAuth,

    #[error("invalid auth")]
    InvalidAuth,

    #[error("project mismatch")]
    ProjectMismatch,

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("project not found")]
    ProjectNotFound,

    #[error("issue not found")]
    IssueNotFound,

    #[error("event not found")]
    EventNotFound,

    #[error("missing fields: {0}")]
    MissingFields(String),

    #[error("no updates supplied")]
    NoUpdates,

    #[error("forbidden")]
    Forbidden,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::MissingAuth => ErrorKind::MissingAuth,
            CoreError::InvalidAuth => ErrorKind::InvalidAuth,
            CoreError::ProjectMismatch => ErrorKind::ProjectMismatch,
            CoreError::ParseFailed(_) => ErrorKind::ParseFailed,
            CoreError::DecompressionFailed(_) => ErrorKind::DecompressionFailed,
            CoreError::ProjectNotFound => ErrorKind::ProjectNotFound,
            CoreError::IssueNotFound => ErrorKind::IssueNotFound,
            CoreError::EventNotFound => ErrorKind::EventNotFound,
            CoreError::MissingFields(_) => ErrorKind::MissingFields,
            CoreError::NoUpdates => ErrorKind::NoUpdates,
            CoreError::Forbidden => ErrorKind::Forbidden,
            CoreError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Short, stable message safe to surface to a caller (never a chained Display of
    /// `anyhow::Error`, which may carry internal detail).
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
