//! HTTP routes served by the network service.
//!
//! Every route reads the selected device from the [`DeviceDirectory`]; scans
//! run on the blocking pool.

use std::error::Error as _;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::DeviceDirectory;
use crate::error::Error;
use crate::ports::ScanDevicePort;

pub const HEALTH_PATH: &str = "/scanlink-health";
pub const DEVICE_PATH: &str = "/scanlink-device";
pub const SCAN_PATH: &str = "/scanlink-scan";
pub const IMAGE_PATH: &str = "/scanlink-image";

type Directory<D> = Arc<DeviceDirectory<D>>;

/// Build the router over a device directory.
pub fn router<D: ScanDevicePort + 'static>(directory: Directory<D>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(DEVICE_PATH, get(device::<D>))
        .route(SCAN_PATH, get(scan_pdf::<D>).post(scan_pdf::<D>))
        .route(IMAGE_PATH, get(scan_image::<D>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(directory)
}

#[derive(Debug, Serialize)]
struct Health {
    status: u16,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct SelectedDevice {
    device: String,
}

/// Error envelope: `{"message": .., "details": ..}` with status 400.
#[derive(Debug, Serialize)]
pub struct ApiError {
    message: &'static str,
    details: Option<String>,
}

impl ApiError {
    fn device_not_found() -> Self {
        Self {
            message: "Device not found",
            details: None,
        }
    }

    fn scan_failed(details: impl ToString) -> Self {
        Self {
            message: "Failed to read from scanner",
            details: Some(details.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        warn!(error = %err, "scan request failed");
        Self::scan_failed(error_chain(&err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// `err: cause: cause` for the whole source chain.
fn error_chain(err: &Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

async fn health() -> Json<Health> {
    Json(Health {
        status: 200,
        message: "ok",
    })
}

async fn device<D: ScanDevicePort + 'static>(
    State(directory): State<Directory<D>>,
) -> Result<Json<SelectedDevice>, ApiError> {
    let device = directory.selected().ok_or_else(ApiError::device_not_found)?;
    Ok(Json(SelectedDevice {
        device: device.identity().to_string(),
    }))
}

async fn scan_pdf<D: ScanDevicePort + 'static>(
    State(directory): State<Directory<D>>,
) -> Result<Response, ApiError> {
    let pdf = scan_with(&directory, |device| device.scan_pdf()).await?;
    Ok(([(CONTENT_TYPE, "application/pdf")], pdf).into_response())
}

async fn scan_image<D: ScanDevicePort + 'static>(
    State(directory): State<Directory<D>>,
) -> Result<Response, ApiError> {
    let image = scan_with(&directory, |device| device.scan_raw()).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], image).into_response())
}

/// Run a blocking scan against the selected device.
async fn scan_with<D, F>(directory: &Directory<D>, scan: F) -> Result<Vec<u8>, ApiError>
where
    D: ScanDevicePort + 'static,
    F: FnOnce(&D) -> crate::Result<Vec<u8>> + Send + 'static,
{
    let device = directory.selected().ok_or_else(ApiError::device_not_found)?;
    let bytes = tokio::task::spawn_blocking(move || scan(&device))
        .await
        .map_err(ApiError::scan_failed)??;
    Ok(bytes)
}
