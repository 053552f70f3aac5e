//! Rate limiting middleware
//!
//! A sliding-log limiter: every key keeps the timestamps of its requests
//! inside the decay window, and a request is rejected once the log is full.

use crate::config::{ThrottleConfig, ThrottleKey};
use crate::{SecurityError, SecurityResult};
use axum::http::StatusCode;
use chrono::Utc;
use larix_http::{LarixRequest, LarixResponse, Middleware, Next, NextFuture, UserId};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Past this many keys, idle logs are dropped
const PRUNE_THRESHOLD: usize = 10_000;

/// Result of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the oldest logged request leaves the window
    pub reset_at: i64,
    /// Seconds until another request is accepted
    pub retry_after: u64,
}

#[derive(Debug, Clone)]
pub struct ThrottleMiddleware {
    config: ThrottleConfig,
    log: Arc<Mutex<HashMap<String, VecDeque<i64>>>>,
}

impl Default for ThrottleMiddleware {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl ThrottleMiddleware {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            log: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `max` requests per `minutes`, keyed by IP
    pub fn per_minutes(max_attempts: u32, minutes: u64) -> Self {
        Self::new(ThrottleConfig {
            max_attempts,
            decay_seconds: minutes * 60,
            key: ThrottleKey::Ip,
        })
    }

    pub fn per_user() -> Self {
        Self::new(ThrottleConfig::per_user())
    }

    pub fn keyed_by(mut self, key: ThrottleKey) -> Self {
        self.config.key = key;
        self
    }

    /// Build from route middleware parameters.
    ///
    /// `["60", "1"]` means 60 requests per minute, `["user"]` selects the
    /// per-user preset, and missing values keep the defaults.
    pub fn from_params(params: &[String]) -> SecurityResult<Self> {
        if params.first().map(String::as_str) == Some("user") {
            return Ok(Self::per_user());
        }

        let mut config = ThrottleConfig::default();
        if let Some(max) = params.first() {
            config.max_attempts = max.parse().map_err(|_| {
                SecurityError::config(format!("Invalid throttle limit '{}'", max))
            })?;
        }
        if let Some(minutes) = params.get(1) {
            let minutes: u64 = minutes.parse().map_err(|_| {
                SecurityError::config(format!("Invalid throttle decay '{}'", minutes))
            })?;
            config.decay_seconds = minutes * 60;
        }
        if params.get(2).map(String::as_str) == Some("user") {
            config.key = ThrottleKey::User;
        }
        if config.max_attempts == 0 || config.decay_seconds == 0 {
            return Err(SecurityError::config("Throttle limit and decay must be positive"));
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Limiter key for `request`
    pub fn key_for(&self, request: &LarixRequest) -> String {
        match self.config.key {
            ThrottleKey::User => match request.get_extension::<UserId>() {
                Some(UserId(id)) => format!("throttle:user:{}", id),
                None => format!("throttle:ip:{}", request.ip()),
            },
            ThrottleKey::Ip => format!("throttle:ip:{}", request.ip()),
        }
    }

    /// Check `key` and log the attempt when it is allowed
    pub fn hit(&self, key: &str) -> ThrottleStatus {
        self.hit_at(key, Utc::now().timestamp_millis())
    }

    fn hit_at(&self, key: &str, now_ms: i64) -> ThrottleStatus {
        let window_ms = (self.config.decay_seconds as i64).saturating_mul(1000);
        let cutoff = now_ms - window_ms;
        let limit = self.config.max_attempts;

        let mut log = self.log.lock();
        if log.len() > PRUNE_THRESHOLD {
            log.retain(|_, entries| entries.back().is_some_and(|last| *last > cutoff));
        }

        let entries = log.entry(key.to_string()).or_default();
        while entries.front().is_some_and(|first| *first <= cutoff) {
            entries.pop_front();
        }

        let allowed = (entries.len() as u32) < limit;
        if allowed {
            entries.push_back(now_ms);
        }

        let oldest = entries.front().copied().unwrap_or(now_ms);
        let reset_ms = oldest + window_ms;
        let retry_after = ((reset_ms - now_ms).max(0) as u64).div_ceil(1000).max(1);

        ThrottleStatus {
            allowed,
            limit,
            remaining: limit.saturating_sub(entries.len() as u32),
            reset_at: reset_ms.div_euclid(1000),
            retry_after,
        }
    }

    /// Forget every attempt logged for `key`
    pub fn clear(&self, key: &str) {
        self.log.lock().remove(key);
    }

    fn add_headers(response: LarixResponse, status: &ThrottleStatus) -> LarixResponse {
        response
            .with_header("x-ratelimit-limit", status.limit.to_string())
            .with_header("x-ratelimit-remaining", status.remaining.to_string())
            .with_header("x-ratelimit-reset", status.reset_at.to_string())
    }

    fn limited_response(request: &LarixRequest, status: &ThrottleStatus) -> LarixResponse {
        let response = if request.wants_json() || request.is_ajax() {
            LarixResponse::with_status(StatusCode::TOO_MANY_REQUESTS).with_json(&json!({
                "error": {
                    "code": "too_many_requests",
                    "message": "Too Many Attempts.",
                    "retry_after": status.retry_after,
                }
            }))
        } else {
            LarixResponse::with_status(StatusCode::TOO_MANY_REQUESTS).with_html(format!(
                "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
                 <title>Too Many Requests</title>\n</head>\n<body>\n\
                 <h1>Too Many Requests</h1>\n\
                 <p>Please try again in {} seconds.</p>\n</body>\n</html>\n",
                status.retry_after
            ))
        };
        Self::add_headers(response, status).with_header("retry-after", status.retry_after.to_string())
    }
}

impl Middleware for ThrottleMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let throttle = self.clone();
        Box::pin(async move {
            let key = throttle.key_for(&request);
            let status = throttle.hit(&key);

            if !status.allowed {
                tracing::warn!(
                    key = %key,
                    limit = status.limit,
                    retry_after = status.retry_after,
                    "request throttled"
                );
                return Self::limited_response(&request, &status);
            }

            let response = next.run(request).await;
            Self::add_headers(response, &status)
        })
    }

    fn name(&self) -> &'static str {
        "ThrottleMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use larix_http::MiddlewarePipeline;

    fn request(ip: &str) -> LarixRequest {
        LarixRequest::build(Method::GET, "/").with_header("x-forwarded-for", ip)
    }

    async fn call(throttle: &ThrottleMiddleware, request: LarixRequest) -> LarixResponse {
        MiddlewarePipeline::new()
            .add(throttle.clone())
            .execute(request, |_req| async { LarixResponse::text("ok") })
            .await
    }

    #[test]
    fn test_sliding_window() {
        let throttle = ThrottleMiddleware::per_minutes(2, 1);
        let start = 1_000_000;

        assert!(throttle.hit_at("k", start).allowed);
        let second = throttle.hit_at("k", start + 10_000);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = throttle.hit_at("k", start + 20_000);
        assert!(!third.allowed);
        assert_eq!(third.retry_after, 40);
        assert_eq!(third.reset_at, (start + 60_000) / 1000);

        // the first entry slides out of the window
        let later = throttle.hit_at("k", start + 60_001);
        assert!(later.allowed);
        assert_eq!(later.remaining, 0);

        throttle.clear("k");
        assert_eq!(throttle.hit_at("k", start + 60_002).remaining, 1);
    }

    #[test]
    fn test_from_params() {
        let throttle = ThrottleMiddleware::from_params(&["60".into(), "1".into()]).unwrap();
        assert_eq!(throttle.config().max_attempts, 60);
        assert_eq!(throttle.config().decay_seconds, 60);

        let throttle = ThrottleMiddleware::from_params(&["5".into(), "10".into()]).unwrap();
        assert_eq!(throttle.config().decay_seconds, 600);

        let throttle = ThrottleMiddleware::from_params(&["user".into()]).unwrap();
        assert_eq!(throttle.config().key, ThrottleKey::User);
        assert_eq!(throttle.config().max_attempts, 1000);

        assert_eq!(
            ThrottleMiddleware::from_params(&[]).unwrap().config(),
            &ThrottleConfig::default()
        );
        assert!(ThrottleMiddleware::from_params(&["abc".into()]).is_err());
        assert!(ThrottleMiddleware::from_params(&["0".into()]).is_err());
    }

    #[test]
    fn test_user_key_falls_back_to_ip() {
        let throttle = ThrottleMiddleware::per_user();
        let mut req = request("10.0.0.1");
        assert_eq!(throttle.key_for(&req), "throttle:ip:10.0.0.1");
        req.insert_extension(UserId("7".into()));
        assert_eq!(throttle.key_for(&req), "throttle:user:7");
    }

    #[tokio::test]
    async fn test_middleware_limits_per_ip() {
        let throttle = ThrottleMiddleware::per_minutes(1, 1);

        let ok = call(&throttle, request("1.1.1.1")).await;
        assert_eq!(ok.status_code(), StatusCode::OK);
        assert_eq!(ok.get_header("x-ratelimit-limit"), Some("1"));
        assert_eq!(ok.get_header("x-ratelimit-remaining"), Some("0"));

        let limited = call(
            &throttle,
            request("1.1.1.1").with_header("accept", "application/json"),
        )
        .await;
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.has_header("retry-after"));
        assert_eq!(limited.json_body().unwrap()["error"]["code"], "too_many_requests");

        let html = call(&throttle, request("1.1.1.1")).await;
        assert!(html.body_text().contains("Too Many Requests"));

        let other = call(&throttle, request("2.2.2.2")).await;
        assert_eq!(other.status_code(), StatusCode::OK);
    }
}
