//! Error taxonomy for the acquisition pipeline and its HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use hardware::camera::DriverError;
use hardware::filter_wheel::FilterWheelError;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The request failed validation; no device command was issued.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Another capture holds the sensor. Requests are rejected, not queued.
    #[error("an exposure is already in progress")]
    DeviceBusy,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    FilterWheel(#[from] FilterWheelError),

    /// The capture was cancelled between phases.
    #[error("capture aborted")]
    Aborted,

    #[error("could not write image: {0}")]
    Write(#[from] std::io::Error),

    /// A worker task died before reporting back.
    #[error("internal error: {0}")]
    Internal(String),
}

/// HTTP wrapper around [`CaptureError`].
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] pub CaptureError);

impl From<DriverError> for ApiError {
    fn from(e: DriverError) -> Self {
        Self(CaptureError::Driver(e))
    }
}

impl From<FilterWheelError> for ApiError {
    fn from(e: FilterWheelError) -> Self {
        Self(CaptureError::FilterWheel(e))
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            CaptureError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CaptureError::DeviceBusy => StatusCode::CONFLICT,
            // The auxiliary device failed or refused; the server itself is fine.
            CaptureError::FilterWheel(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}
