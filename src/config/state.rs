// Application state module
// Shared runtime state handed to every connection

use hyper::header::HeaderValue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::types::Config;
use crate::logger;

/// Application state
pub struct AppState {
    pub config: Config,

    /// Monotonic process start, the base for reported uptime
    pub started_at: Instant,

    /// `Server` header value, `None` when `http.server_name` is not a valid header
    pub server_header: Option<HeaderValue>,

    /// Active connection counter
    pub active_connections: AtomicUsize,

    /// Shutdown signal (SIGTERM, SIGINT)
    pub shutdown: Notify,
    pub shutdown_requested: AtomicBool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            started_at: Instant::now(),
            server_header: server_header(&config.http.server_name),
            active_connections: AtomicUsize::new(0),
            shutdown: Notify::new(),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Time elapsed since the state was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Mark shutdown as requested and wake every waiter
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested, including before this call
    pub async fn shutdown_signaled(&self) {
        // Register before checking the flag so a concurrent notify is not lost
        let notified = self.shutdown.notified();
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }
}

fn server_header(name: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(name) {
        Ok(value) => Some(value),
        Err(_) => {
            logger::log_warning(&format!(
                "Invalid server_name '{name}', Server header omitted"
            ));
            None
        }
    }
}
