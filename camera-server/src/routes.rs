//! HTTP surface.
//!
//! Thin axum handlers over the [`AcquisitionController`] and the filter
//! wheel client. Blocking device work runs on the blocking pool; written
//! images are served statically under `/files`.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task;
use tower_http::services::ServeDir;

use hardware::camera::CameraDriver;
use hardware::filter_wheel::{name_for_position, position_for_name, FilterWheelClient};

use crate::controller::{AcquisitionController, AcquisitionState, CaptureResult};
use crate::error::{ApiError, CaptureError};
use crate::request::ExposureRequest;

pub struct AppState<D: CameraDriver> {
    pub controller: Arc<AcquisitionController<D>>,
    pub wheel: FilterWheelClient,
}

impl<D: CameraDriver> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            wheel: self.wheel.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    /// 0 success, 1 aborted, 2 failed.
    pub status: u8,
    pub filename: Option<String>,
    pub url: Option<String>,
    pub message: String,
}

impl From<CaptureResult> for CaptureResponse {
    fn from(result: CaptureResult) -> Self {
        Self {
            status: result.status.code(),
            filename: result.filename,
            url: result.url,
            message: result.message,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: AcquisitionState,
    /// None while a capture holds the camera.
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TemperatureResponse {
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TemperatureTarget {
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct FilterResponse {
    position: u8,
    name: Option<&'static str>,
}

/// Select a filter by name or by raw wheel position.
#[derive(Debug, Deserialize)]
struct FilterSelect {
    filter: Option<String>,
    position: Option<u8>,
}

#[derive(Debug, Serialize)]
struct AbortResponse {
    /// False when nothing was in flight.
    accepted: bool,
}

fn join_error(e: task::JoinError) -> ApiError {
    ApiError::from(CaptureError::Internal(e.to_string()))
}

async fn capture<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(request): Json<ExposureRequest>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let controller = state.controller.clone();
    let result = task::spawn_blocking(move || controller.capture(&request))
        .await
        .map_err(join_error)??;
    Ok(Json(result.into()))
}

async fn abort<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<AbortResponse> {
    Json(AbortResponse {
        accepted: state.controller.abort(),
    })
}

async fn status<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.controller.state(),
        temperature: state.controller.temperature(),
    })
}

async fn get_temperature<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<TemperatureResponse> {
    Json(TemperatureResponse {
        temperature: state.controller.temperature(),
    })
}

async fn set_temperature<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(body): Json<TemperatureTarget>,
) -> Result<Json<TemperatureResponse>, ApiError> {
    state.controller.set_target_temperature(body.temperature)?;
    Ok(Json(TemperatureResponse {
        temperature: state.controller.temperature(),
    }))
}

async fn get_filter<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Result<Json<FilterResponse>, ApiError> {
    let wheel = state.wheel.clone();
    let position = task::spawn_blocking(move || wheel.get_position())
        .await
        .map_err(join_error)??;
    Ok(Json(FilterResponse {
        position,
        name: name_for_position(position),
    }))
}

async fn set_filter<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(body): Json<FilterSelect>,
) -> Result<Json<FilterResponse>, ApiError> {
    let position = match (body.filter, body.position) {
        (Some(name), _) => position_for_name(&name).ok_or_else(|| {
            CaptureError::InvalidParameter(format!("unknown filter {name:?}"))
        })?,
        (None, Some(position)) => position,
        (None, None) => {
            return Err(CaptureError::InvalidParameter(
                "either filter or position is required".to_string(),
            )
            .into())
        }
    };

    let wheel = state.wheel.clone();
    task::spawn_blocking(move || wheel.move_to(position))
        .await
        .map_err(join_error)??;
    Ok(Json(FilterResponse {
        position,
        name: name_for_position(position),
    }))
}

async fn home_filter<D: CameraDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Result<Json<FilterResponse>, ApiError> {
    let wheel = state.wheel.clone();
    task::spawn_blocking(move || wheel.home())
        .await
        .map_err(join_error)??;
    Ok(Json(FilterResponse {
        position: 0,
        name: None,
    }))
}

/// Build the application router.
pub fn router<D: CameraDriver + 'static>(state: AppState<D>, files_root: &Path) -> Router {
    Router::new()
        .route("/capture", post(capture::<D>))
        .route("/abort", post(abort::<D>))
        .route("/status", get(status::<D>))
        .route(
            "/temperature",
            get(get_temperature::<D>).post(set_temperature::<D>),
        )
        .route("/filter", get(get_filter::<D>).post(set_filter::<D>))
        .route("/filter/home", post(home_filter::<D>))
        .nest_service("/files", ServeDir::new(files_root))
        .with_state(state)
}
