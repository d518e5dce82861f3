//! Custom single-threaded runtime.
//!
//! Backend-independent pieces:
//! - `Buffer`: Per-connection growable byte buffer
//! - `Connection`: Connection state machine driven by `Readiness`
//! - `ConnectionRegistry`: Generation-stamped connection table
//!
//! The `mio` backend maps poll events to `Readiness` and connection
//! `Intents` back to poll interest.

mod buffer;
mod connection;
mod mio;
mod request;

pub(crate) use buffer::Buffer;
pub(crate) use connection::{
    ConnConfig, ConnId, Connection, ConnectionRegistry, Intents, Readiness,
};

use crate::config::Config;

/// Run the server until a fatal error.
pub fn run(config: Config) -> std::io::Result<()> {
    self::mio::run(config)
}
