//! API module
//!
//! Route table for the public JSON endpoints, plus the per-request
//! wrapping every response goes through (common headers, HEAD, access log).

mod handlers;
mod response;
mod types;
mod users;

use http_body_util::Full;
use hyper::body::{Body as _, Bytes};
use hyper::header::{HeaderName, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppState;
use crate::logger::{self, AccessLogEntry};

/// Main entry point for HTTP request handling
///
/// The request body is never read, so any body type is accepted.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method();
    let path = req.uri().path();

    let mut response = route(method, path, &state);
    response::apply_common_headers(
        &mut response,
        state.server_header.as_ref(),
        state.config.http.enable_cors,
    );
    if *method == Method::HEAD {
        response = response::strip_body(response);
    }

    if state.config.logging.access_log {
        log_access(&req, &response, peer_addr, started, &state);
    }
    Ok(response)
}

/// Dispatch method + path to a handler
///
/// HEAD is served by the GET handler. Anything unmatched gets the 404 body.
pub fn route(method: &Method, path: &str, state: &AppState) -> Response<Full<Bytes>> {
    let is_get = matches!(*method, Method::GET | Method::HEAD);

    match path {
        "/" if is_get => handlers::welcome(),
        "/api/health" if is_get => handlers::health(state),
        "/api/users" if is_get => handlers::list_users(),
        "/api/status" if is_get => handlers::status(state),
        _ if *method == Method::OPTIONS && state.config.http.enable_cors => {
            response::preflight_response()
        }
        _ => {
            logger::log_debug(&format!("No route for {method} {path}"));
            handlers::not_found()
        }
    }
}

fn log_access<B>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
    state: &AppState,
) {
    let header = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = http_version_label(req.version()).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response.body().size_hint().exact().unwrap_or(0);
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

fn http_version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
    use hyper::{HeaderMap, StatusCode};
    use serde_json::Value;

    fn test_state(enable_cors: bool) -> Arc<AppState> {
        let mut cfg = Config::default();
        cfg.logging.access_log = false;
        cfg.http.enable_cors = enable_cors;
        Arc::new(AppState::new(&cfg))
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let req = Request::builder().method(method).uri(uri).body(()).unwrap();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let response = handle_request(req, Arc::clone(state), peer).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, bytes)
    }

    async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let (status, headers, body) = send(state, Method::GET, uri).await;
        assert!(headers[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn keys(value: &Value) -> Vec<&str> {
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[tokio::test]
    async fn test_root_welcome() {
        let state = test_state(true);
        let (status, body) = get_json(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(keys(&body), ["message", "status", "version"]);
        assert_eq!(body["message"], "Welcome to CI/CD MERN Backend API");
        assert!(body["version"].is_string());
        assert!(body["status"].is_string());
    }

    #[tokio::test]
    async fn test_root_is_idempotent() {
        let state = test_state(true);
        let (_, first) = get_json(&state, "/").await;
        let (_, second) = get_json(&state, "/").await;
        assert_eq!(first["message"], second["message"]);
        assert_eq!(first["status"], second["status"]);
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state(true);
        let (status, body) = get_json(&state, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(keys(&body), ["status", "timestamp", "uptime"]);
        assert_eq!(body["status"], "healthy");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_health_uptime_non_decreasing() {
        let state = test_state(true);
        let (_, first) = get_json(&state, "/api/health").await;
        let (_, second) = get_json(&state, "/api/health").await;
        assert!(second["uptime"].as_f64().unwrap() >= first["uptime"].as_f64().unwrap());
    }

    #[tokio::test]
    async fn test_users() {
        let state = test_state(true);
        let (status, body) = get_json(&state, "/api/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(keys(&body), ["count", "data", "success"]);
        assert_eq!(body["success"], true);

        let data = body["data"].as_array().unwrap();
        assert!(!data.is_empty());
        assert_eq!(body["count"].as_u64().unwrap(), data.len() as u64);
        for user in data {
            assert_eq!(keys(user), ["email", "id", "name"]);
            assert!(user["id"].is_u64());
        }
        assert_eq!(data[0]["name"], "John Doe");
    }

    #[tokio::test]
    async fn test_users_ignores_query_string() {
        let state = test_state(true);
        let (status, _) = get_json(&state, "/api/users?page=2").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status() {
        let state = test_state(true);
        let (status, body) = get_json(&state, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(keys(&body), ["environment", "node_version", "server"]);
        assert_eq!(body["server"], "running");
        assert!(!body["environment"].as_str().unwrap().is_empty());
        assert!(!body["node_version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = test_state(true);
        let (status, _, body) = send(&state, Method::GET, "/nonexistent-route").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(&body[..], br#"{"error":"Route not found"}"#);
    }

    #[tokio::test]
    async fn test_trailing_slash_not_matched() {
        let state = test_state(true);
        let (status, _) = get_json(&state, "/api/users/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_found() {
        let state = test_state(true);
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            let (status, _, body) = send(&state, method, "/api/users").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["error"], "Route not found");
        }
    }

    #[tokio::test]
    async fn test_head_has_empty_body() {
        let state = test_state(true);
        let (status, headers, body) = send(&state, Method::HEAD, "/api/users").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_ne!(headers[CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let state = test_state(true);
        let (status, headers, body) = send(&state, Method::OPTIONS, "/api/users").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let state = test_state(false);
        let (status, headers, _) = send(&state, Method::OPTIONS, "/api/users").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let (_, headers, _) = send(&state, Method::GET, "/").await;
        assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_server_header_from_state() {
        let state = test_state(true);
        let (_, headers, _) = send(&state, Method::GET, "/api/health").await;
        assert_eq!(headers[SERVER], state.config.http.server_name.as_str());

        let mut cfg = Config::default();
        cfg.logging.access_log = false;
        cfg.http.server_name = "bad\nname".to_string();
        let state = Arc::new(AppState::new(&cfg));
        for _ in 0..3 {
            let (status, headers, _) = send(&state, Method::GET, "/").await;
            assert_eq!(status, StatusCode::OK);
            assert!(headers.get(SERVER).is_none());
        }
    }

    #[test]
    fn test_http_version_label() {
        assert_eq!(http_version_label(Version::HTTP_10), "1.0");
        assert_eq!(http_version_label(Version::HTTP_11), "1.1");
        assert_eq!(http_version_label(Version::HTTP_2), "2");
    }
}
