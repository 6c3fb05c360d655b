//! HTTP routes driven in-process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use scanlink_core::error::DeviceStage;
use scanlink_core::{http, DeviceDirectory, DeviceManagerPort, Error, Result, ScanDevicePort};
use serde_json::{json, Value};
use tower::ServiceExt;

struct FakeDevice {
    name: String,
    scans: Arc<AtomicUsize>,
}

impl ScanDevicePort for FakeDevice {
    fn identity(&self) -> &str {
        &self.name
    }

    fn scan_raw(&self) -> Result<Vec<u8>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.name == "jammed" {
            return Err(Error::device(DeviceStage::Read, "paper jam", None));
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    fn scan_pdf(&self) -> Result<Vec<u8>> {
        self.scan_raw()?;
        Ok(b"%PDF-1.5\n%fake\n".to_vec())
    }
}

struct FakeManager {
    scans: Arc<AtomicUsize>,
}

impl DeviceManagerPort for FakeManager {
    type Device = FakeDevice;

    fn enumerate(&self) -> Result<Vec<FakeDevice>> {
        Ok(["office", "jammed"]
            .iter()
            .map(|name| FakeDevice {
                name: name.to_string(),
                scans: Arc::clone(&self.scans),
            })
            .collect())
    }

    fn close(&self) {}
}

fn app_counting(selected: Option<&str>) -> (Router, Arc<AtomicUsize>) {
    let scans = Arc::new(AtomicUsize::new(0));
    let directory = Arc::new(DeviceDirectory::new());
    directory
        .refresh(&FakeManager {
            scans: Arc::clone(&scans),
        })
        .unwrap();
    directory.select(selected.map(str::to_string));
    (http::router(directory), scans)
}

fn app(selected: Option<&str>) -> Router {
    app_counting(selected).0
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|value| value.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, _, body) = send(app(None), Method::GET, http::HEALTH_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"status": 200, "message": "ok"}));
}

#[tokio::test]
async fn test_device_reports_selection() {
    let (status, _, body) = send(app(Some("office")), Method::GET, http::DEVICE_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"device": "office"}));
}

#[tokio::test]
async fn test_device_without_selection() {
    let (status, _, body) = send(app(None), Method::GET, http::DEVICE_PATH).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&body),
        json!({"message": "Device not found", "details": null})
    );
}

#[tokio::test]
async fn test_selection_missing_from_snapshot() {
    let (status, _, body) = send(app(Some("unplugged")), Method::GET, http::DEVICE_PATH).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["message"], "Device not found");
}

#[tokio::test]
async fn test_scan_returns_pdf() {
    for method in [Method::GET, Method::POST] {
        let (status, content_type, body) =
            send(app(Some("office")), method, http::SCAN_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/pdf"));
        assert!(body.starts_with(b"%PDF"));
    }
}

#[tokio::test]
async fn test_scan_without_device_never_scans() {
    let (app, scans) = app_counting(Some("unplugged"));
    let (status, _, body) = send(app, Method::POST, http::SCAN_PATH).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&body),
        json!({"message": "Device not found", "details": null})
    );
    assert_eq!(scans.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scan_failure_envelope() {
    let (status, _, body) = send(app(Some("jammed")), Method::GET, http::SCAN_PATH).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["message"], "Failed to read from scanner");
    let details = body["details"].as_str().unwrap();
    assert!(details.contains("reading image data"));
    assert!(details.contains("paper jam"));
}

#[tokio::test]
async fn test_image_returns_raw_bytes() {
    let (status, content_type, body) =
        send(app(Some("office")), Method::GET, http::IMAGE_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(body, vec![0xFF, 0xD8, 0xFF, 0xD9]);
}

#[tokio::test]
async fn test_cors_preflight() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(http::SCAN_PATH)
                .header(header::ORIGIN, "http://example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
