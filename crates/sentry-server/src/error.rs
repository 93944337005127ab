use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use sentry_core::CoreError;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Maps the core's typed errors onto the `{"error", "message"}` envelope and
/// HTTP status codes from §7: auth failures 401, not-found 404, bad shape 400,
/// forbidden 403, anything unexpected 500 with a generic message.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::MissingAuth | CoreError::InvalidAuth => StatusCode::UNAUTHORIZED,
            CoreError::ProjectNotFound | CoreError::IssueNotFound | CoreError::EventNotFound => {
                StatusCode::NOT_FOUND
            }
            CoreError::ProjectMismatch
            | CoreError::ParseFailed(_)
            | CoreError::DecompressionFailed(_)
            | CoreError::MissingFields(_)
            | CoreError::NoUpdates => StatusCode::BAD_REQUEST,
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self.0, CoreError::Internal(_)) {
            tracing::error!(error = %self.0, "internal error handling request");
        }

        let body = ErrorBody {
            error: self.0.kind().as_str(),
            message: self.0.public_message(),
        };

        (status, Json(body)).into_response()
    }
}
