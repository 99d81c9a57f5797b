// API payload types
// Every JSON body the router can produce

use hyper::StatusCode;
use serde::Serialize;
use std::fmt;

use super::users::User;

/// `GET /` body
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Welcome {
    pub message: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

/// `GET /api/health` body
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// ISO-8601 UTC time of the request
    pub timestamp: String,
    /// Seconds since process start
    pub uptime: f64,
}

/// `GET /api/users` body
#[derive(Debug, Serialize)]
pub struct UserList<'a> {
    pub success: bool,
    count: usize,
    data: &'a [User],
}

impl<'a> UserList<'a> {
    /// Wrap a user slice; `count` always mirrors `data.len()`
    pub const fn new(data: &'a [User]) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

/// `GET /api/status` body
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub server: &'static str,
    pub environment: String,
    /// Runtime version; the key name is kept for client compatibility
    pub node_version: &'static str,
}

/// Error body: `{"error": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Request-level errors surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// No route matched method + path
    RouteNotFound,
}

impl ApiError {
    pub const fn status(self) -> StatusCode {
        match self {
            Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn to_body(self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RouteNotFound => f.write_str("Route not found"),
        }
    }
}
