// Error → response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serena_billing::BillingError;
use serena_core::{ApiError, ErrorCode, HttpStatus, SerenaError};
use tracing::error;

/// An `ApiError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl HttpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ApiError::with_message(
            HttpStatus::BadRequest,
            ErrorCode::InvalidRequest,
            message,
        ))
    }

    pub fn unauthorized() -> Self {
        Self(ApiError::unauthorized())
    }
}

pub(crate) fn status_code(status: HttpStatus) -> StatusCode {
    StatusCode::from_u16(status.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let api = self.0;
        let body = serde_json::json!({
            "error": {
                "message": api.message,
                "code": api.code,
                "status": api.status.status_code(),
            }
        });

        (status_code(api.status), Json(body)).into_response()
    }
}

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<SerenaError> for HttpError {
    fn from(e: SerenaError) -> Self {
        if !matches!(e, SerenaError::Api(_)) {
            error!(error = %e, "request failed");
        }
        Self(e.into_api_error())
    }
}

impl From<BillingError> for HttpError {
    fn from(e: BillingError) -> Self {
        Self(e.into())
    }
}
