// Server loop module
// Accepts connections until shutdown, then drains in-flight ones

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// How often the drain phase re-checks the connection counter
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept loop for the public listener.
///
/// Must run inside a `LocalSet`: connections are spawned with `spawn_local`.
/// Returns once shutdown was requested and in-flight connections have
/// finished or `performance.shutdown_timeout` has elapsed.
pub async fn start_server_loop(listener: TcpListener, state: Arc<AppState>) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = state.shutdown_signaled() => break,
        }
    }

    // Stop accepting before draining
    drop(listener);
    drain_connections(&state).await;
}

/// Wait for active connections to reach zero or the shutdown deadline.
async fn drain_connections(state: &AppState) {
    let active = state.active_connections.load(Ordering::SeqCst);
    logger::log_shutdown_started(active);

    let deadline = tokio::time::Instant::now()
        + Duration::from_secs(state.config.performance.shutdown_timeout);

    loop {
        let remaining = state.active_connections.load(Ordering::SeqCst);
        if remaining == 0 || tokio::time::Instant::now() >= deadline {
            logger::log_shutdown_complete(remaining);
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
