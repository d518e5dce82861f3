//! framekv: A single-threaded key-value server
//!
//! Clients speak a length-prefixed binary protocol:
//! - `get`, `set` and `del` against one in-memory store
//! - Pipelined requests answered in order
//!
//! Features:
//! - One readiness-driven event loop (epoll/kqueue via mio)
//! - Safety ceilings on frame size and argument count
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod runtime;
mod storage;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_connections = config.max_connections,
        max_payload = config.max_payload,
        max_args = config.max_args,
        max_pending_output = config.max_pending_output,
        "Starting framekv server"
    );

    runtime::run(config)?;
    Ok(())
}
