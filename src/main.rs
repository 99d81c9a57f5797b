use std::sync::Arc;

mod api;
mod config;
mod logger;
mod server;

use server::{create_reusable_listener, start_server_loop, start_signal_handler};

/// Config file used when no path argument is given (extension optional)
const DEFAULT_CONFIG_PATH: &str = "config";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Request handling is single-threaded: one event loop, local tasks
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;

    let state = Arc::new(config::AppState::new(&cfg));
    start_signal_handler(Arc::clone(&state))?;

    logger::log_server_start(&addr, &cfg);

    // LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local.run_until(start_server_loop(listener, state)).await;

    Ok(())
}
