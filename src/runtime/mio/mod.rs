//! mio-based event loop implementation.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS).

mod event_loop;

pub use event_loop::EventLoop;

use crate::config::Config;

/// Run the server using mio backend.
pub fn run(config: Config) -> std::io::Result<()> {
    EventLoop::bind(&config)?.run()
}
