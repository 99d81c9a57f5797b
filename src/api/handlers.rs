// Route handlers
// Each builds one JSON payload; none can fail

use chrono::{SecondsFormat, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

use super::response::json_response;
use super::types::{ApiError, HealthReport, StatusReport, UserList, Welcome};
use super::users;
use crate::config::AppState;

pub const WELCOME_MESSAGE: &str = "Welcome to CI/CD MERN Backend API";

/// Process variable naming the deployment environment
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Compiler that built this binary, as `rustc --version` printed it
pub const RUNTIME_VERSION: &str = env!("RUSTC_VERSION");

pub fn welcome_body() -> Welcome {
    Welcome {
        message: WELCOME_MESSAGE,
        version: env!("CARGO_PKG_VERSION"),
        status: "active",
    }
}

pub fn health_body(state: &AppState) -> HealthReport {
    HealthReport {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime().as_secs_f64(),
    }
}

pub fn status_body(state: &AppState) -> StatusReport {
    StatusReport {
        server: "running",
        environment: resolve_environment(
            std::env::var(ENVIRONMENT_VAR).ok(),
            &state.config.app.environment,
        ),
        node_version: RUNTIME_VERSION,
    }
}

/// Process value wins unless unset or blank
fn resolve_environment(from_process: Option<String>, configured: &str) -> String {
    from_process
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| configured.to_string())
}

/// `GET /`
pub fn welcome() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &welcome_body())
}

/// `GET /api/health`
pub fn health(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &health_body(state))
}

/// `GET /api/users`
pub fn list_users() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &UserList::new(users::all()))
}

/// `GET /api/status`
pub fn status(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &status_body(state))
}

/// Catch-all for unmatched method + path
pub fn not_found() -> Response<Full<Bytes>> {
    let err = ApiError::RouteNotFound;
    json_response(err.status(), &err.to_body())
}
