// Connection handling module
// Accepts a single TCP connection and serves it over HTTP/1.1

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::Instant;

use super::activity::{Activity, Limits, Phase, TrackedStream};

use crate::api;
use crate::config::AppState;
use crate::logger;

/// Accept and process a connection, checking limits and logging.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared application state
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
) {
    // Increment first, then check limit (prevents race condition)
    let prev_count = state.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(state));
}

/// Serve one connection in a local task.
///
/// Timeouts follow the connection's phase: the request head must arrive
/// within `read_timeout` of its first byte (or of accept), a keep-alive
/// connection may sit idle for `keep_alive_timeout` between requests.
/// On shutdown or expiry it finishes the in-flight request and closes.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: Arc<AppState>,
) {
    tokio::task::spawn_local(async move {
        let performance = &state.config.performance;
        let limits = Limits::from_config(performance);
        let activity = Activity::new();
        let io = TokioIo::new(TrackedStream::new(stream, Rc::clone(&activity)));

        let mut builder = http1::Builder::new();
        // hyper's header timer also runs while idle; phases are timed below
        builder
            .keep_alive(performance.keep_alive_timeout > 0)
            .header_read_timeout(None::<std::time::Duration>);

        let service_state = Arc::clone(&state);
        let service_activity = Rc::clone(&activity);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let state = Arc::clone(&service_state);
                let activity = Rc::clone(&service_activity);
                async move {
                    activity.begin_request();
                    let response = api::handle_request(req, state, peer_addr).await;
                    activity.end_request();
                    response
                }
            }),
        );
        tokio::pin!(conn);

        let outcome = loop {
            let (deadline, _) = activity.deadline(&limits);
            tokio::select! {
                res = conn.as_mut() => break Some(res),
                () = activity.changed.notified() => continue,
                () = tokio::time::sleep_until(deadline) => {
                    // Activity may have moved the deadline while asleep
                    let (deadline, phase) = activity.deadline(&limits);
                    if deadline > Instant::now() {
                        continue;
                    }
                    log_expired(phase, peer_addr, &limits);
                }
                () = state.shutdown_signaled() => {}
            }
            conn.as_mut().graceful_shutdown();
            break tokio::time::timeout(limits.write, conn.as_mut()).await.ok();
        };

        match outcome {
            Some(Ok(())) => {}
            Some(Err(err)) => logger::log_connection_error(&err),
            None => logger::log_warning(&format!(
                "Connection from {peer_addr} did not close within {} seconds",
                limits.write.as_secs()
            )),
        }

        state.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}

fn log_expired(phase: Phase, peer_addr: std::net::SocketAddr, limits: &Limits) {
    match phase {
        Phase::Idle => logger::log_debug(&format!(
            "Closing idle connection from {peer_addr} after {} seconds",
            limits.idle.as_secs()
        )),
        Phase::ReadingHead => logger::log_warning(&format!(
            "Connection from {peer_addr} timed out reading request after {} seconds",
            limits.read.as_secs()
        )),
        Phase::Responding => logger::log_warning(&format!(
            "Connection from {peer_addr} timed out writing response after {} seconds",
            limits.write.as_secs()
        )),
    }
}
