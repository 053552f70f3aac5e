//! Maintenance mode
//!
//! `MaintenanceMode` manages the `storage/framework/maintenance.json` marker
//! file; `MaintenanceMiddleware` answers 503 while it exists.

use crate::errors::{HttpError, HttpResult};
use crate::middleware::{Middleware, Next, NextFuture};
use crate::request::LarixRequest;
use crate::response::LarixResponse;
use axum::http::StatusCode;
use chrono::Utc;
use larix_core::MAINTENANCE_FILE;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

pub const DEFAULT_RETRY: u64 = 3600;
pub const DEFAULT_MESSAGE: &str = "Service Unavailable";

fn default_retry() -> u64 {
    DEFAULT_RETRY
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

/// Contents of the maintenance marker file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePayload {
    /// Unix timestamp when maintenance started
    #[serde(default)]
    pub time: i64,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_retry")]
    pub retry: u64,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

impl Default for MaintenancePayload {
    fn default() -> Self {
        Self {
            time: Utc::now().timestamp(),
            message: default_message(),
            retry: DEFAULT_RETRY,
            secret: None,
            allowed_ips: Vec::new(),
            allowed_paths: Vec::new(),
        }
    }
}

impl MaintenancePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn retry(mut self, seconds: u64) -> Self {
        self.retry = seconds;
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn allow_ip(mut self, ip: impl Into<String>) -> Self {
        self.allowed_ips.push(ip.into());
        self
    }

    pub fn allow_path(mut self, path: impl Into<String>) -> Self {
        self.allowed_paths.push(path.into());
        self
    }

    /// Whether `request` may pass while maintenance is active
    pub fn allows(&self, request: &LarixRequest) -> bool {
        let ip = request.ip();
        if self.allowed_ips.iter().any(|allowed| *allowed == ip) {
            return true;
        }
        let path = request.path();
        if self
            .allowed_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return true;
        }
        match self.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => {
                request.query_param("bypass").map(String::as_str) == Some(secret)
                    || request.header("x-maintenance-bypass") == Some(secret)
            }
            None => false,
        }
    }
}

/// Maintenance marker file manager
#[derive(Debug, Clone)]
pub struct MaintenanceMode {
    path: PathBuf,
}

impl MaintenanceMode {
    /// Manager for `<base>/storage/framework/maintenance.json`
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self::at(base_path.as_ref().join(MAINTENANCE_FILE))
    }

    /// Manager for an explicit file path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn enable(&self, payload: &MaintenancePayload) -> HttpResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(payload)
            .map_err(|e| HttpError::internal(format!("Encoding maintenance payload: {}", e)))?;
        std::fs::write(&self.path, contents).map_err(io_error)?;
        tracing::info!(path = %self.path.display(), "maintenance mode enabled");
        Ok(())
    }

    /// Remove the marker; returns whether maintenance was active
    pub fn disable(&self) -> HttpResult<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("maintenance mode disabled");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.exists()
    }

    /// Current payload, `None` when the application is up
    pub fn status(&self) -> HttpResult<Option<MaintenancePayload>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        // a marker that cannot be parsed still means the application is down
        Ok(Some(serde_json::from_str(&contents).unwrap_or_default()))
    }
}

fn io_error(e: std::io::Error) -> HttpError {
    HttpError::internal(format!("Maintenance file error: {}", e))
}

/// Responds 503 while maintenance mode is active
#[derive(Debug, Clone)]
pub struct MaintenanceMiddleware {
    mode: MaintenanceMode,
    allowed_ips: Vec<String>,
    allowed_paths: Vec<String>,
}

impl MaintenanceMiddleware {
    pub fn new(mode: MaintenanceMode) -> Self {
        Self {
            mode,
            allowed_ips: Vec::new(),
            allowed_paths: Vec::new(),
        }
    }

    pub fn allow_ip(mut self, ip: impl Into<String>) -> Self {
        self.allowed_ips.push(ip.into());
        self
    }

    pub fn allow_path(mut self, path: impl Into<String>) -> Self {
        self.allowed_paths.push(path.into());
        self
    }

    fn render(request: &LarixRequest, payload: &MaintenancePayload) -> LarixResponse {
        let response = if request.wants_json() || request.is_ajax() {
            LarixResponse::with_status(StatusCode::SERVICE_UNAVAILABLE).with_json(&json!({
                "error": {
                    "code": "maintenance_mode",
                    "message": payload.message,
                    "retry_after": payload.retry,
                }
            }))
        } else {
            let message = html_escape::encode_text(&payload.message);
            LarixResponse::with_status(StatusCode::SERVICE_UNAVAILABLE).with_html(format!(
                "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
                 <title>Under Maintenance</title>\n</head>\n<body>\n\
                 <h1>Under Maintenance</h1>\n<p>{}</p>\n\
                 <p>Please check back shortly.</p>\n</body>\n</html>\n",
                message
            ))
        };
        response.with_header("retry-after", payload.retry.to_string())
    }
}

impl Middleware for MaintenanceMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let this = self.clone();
        Box::pin(async move {
            let payload = match this.mode.status() {
                Ok(Some(payload)) => payload,
                Ok(None) => return next.run(request).await,
                Err(e) => {
                    tracing::error!("Reading maintenance state failed: {}", e);
                    MaintenancePayload::default()
                }
            };

            let mut payload = payload;
            payload.allowed_ips.extend(this.allowed_ips.iter().cloned());
            payload.allowed_paths.extend(this.allowed_paths.iter().cloned());
            if payload.allows(&request) {
                return next.run(request).await;
            }

            Self::render(&request, &payload)
        })
    }

    fn name(&self) -> &'static str {
        "MaintenanceMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewarePipeline;
    use axum::http::Method;
    use tempfile::TempDir;

    async fn call(mode: &MaintenanceMode, request: LarixRequest) -> LarixResponse {
        MiddlewarePipeline::new()
            .add(MaintenanceMiddleware::new(mode.clone()).allow_path("/health"))
            .execute(request, |_req| async { LarixResponse::text("up") })
            .await
    }

    #[test]
    fn test_enable_disable_status() {
        let dir = TempDir::new().unwrap();
        let mode = MaintenanceMode::new(dir.path());
        assert!(!mode.is_enabled());
        assert_eq!(mode.status().unwrap(), None);

        mode.enable(&MaintenancePayload::new().message("Upgrading").secret("s3cret"))
            .unwrap();
        assert!(mode.is_enabled());
        assert!(dir.path().join("storage/framework/maintenance.json").exists());
        let status = mode.status().unwrap().unwrap();
        assert_eq!(status.message, "Upgrading");
        assert_eq!(status.retry, 3600);

        assert!(mode.disable().unwrap());
        assert!(!mode.disable().unwrap());
    }

    #[test]
    fn test_payload_defaults_from_sparse_file() {
        let payload: MaintenancePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.message, "Service Unavailable");
        assert_eq!(payload.retry, 3600);
    }

    #[tokio::test]
    async fn test_passes_through_when_up() {
        let dir = TempDir::new().unwrap();
        let mode = MaintenanceMode::new(dir.path());
        let response = call(&mode, LarixRequest::build(Method::GET, "/")).await;
        assert_eq!(response.body_text(), "up");
    }

    #[tokio::test]
    async fn test_blocks_with_json_and_html() {
        let dir = TempDir::new().unwrap();
        let mode = MaintenanceMode::new(dir.path());
        mode.enable(&MaintenancePayload::new().retry(120)).unwrap();

        let request = LarixRequest::build(Method::GET, "/").with_header("accept", "application/json");
        let response = call(&mode, request).await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.get_header("retry-after"), Some("120"));
        let body = response.json_body().unwrap();
        assert_eq!(body["error"]["code"], "maintenance_mode");
        assert_eq!(body["error"]["retry_after"], 120);

        let response = call(&mode, LarixRequest::build(Method::GET, "/")).await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body_text().contains("Under Maintenance"));
    }

    #[tokio::test]
    async fn test_bypass_rules() {
        let dir = TempDir::new().unwrap();
        let mode = MaintenanceMode::new(dir.path());
        mode.enable(
            &MaintenancePayload::new()
                .secret("letmein")
                .allow_ip("10.1.1.1")
                .allow_path("/status"),
        )
        .unwrap();

        let by_query = LarixRequest::build(Method::GET, "/?bypass=letmein");
        assert_eq!(call(&mode, by_query).await.body_text(), "up");

        let by_header =
            LarixRequest::build(Method::GET, "/").with_header("x-maintenance-bypass", "letmein");
        assert_eq!(call(&mode, by_header).await.body_text(), "up");

        let by_ip = LarixRequest::build(Method::GET, "/").with_header("x-forwarded-for", "10.1.1.1");
        assert_eq!(call(&mode, by_ip).await.body_text(), "up");

        assert_eq!(
            call(&mode, LarixRequest::build(Method::GET, "/status/db")).await.body_text(),
            "up"
        );
        assert_eq!(
            call(&mode, LarixRequest::build(Method::GET, "/health")).await.body_text(),
            "up"
        );

        let wrong = LarixRequest::build(Method::GET, "/?bypass=nope");
        assert_eq!(
            call(&mode, wrong).await.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
