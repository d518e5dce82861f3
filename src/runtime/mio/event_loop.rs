//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! mio registrations are edge-triggered. Connections therefore read and
//! write until the socket would block, and a change of intents re-registers
//! the socket, which re-arms readiness that is already pending.

use crate::config::Config;
use crate::protocols::kv::Limits;
use crate::runtime::{ConnConfig, ConnId, Connection, ConnectionRegistry, Intents, Readiness};
use crate::storage::Store;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Single-threaded reactor owning the listener, every connection and the
/// store.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: ConnectionRegistry<TcpStream>,
    store: Store,
    /// Read buffer shared by all connections.
    scratch: Vec<u8>,
    conn_config: ConnConfig,
}

impl EventLoop {
    /// Bind the listener and set up the poller.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let poll = Poll::new()?;

        let listener = create_listener(config.listen)?;
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            max_payload = config.max_payload,
            max_args = config.max_args,
            "Listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(config.batch_size),
            listener,
            connections: ConnectionRegistry::new(config.max_connections),
            store: Store::new(),
            scratch: vec![0u8; config.read_buffer_size],
            conn_config: ConnConfig {
                limits: Limits {
                    max_payload: config.max_payload,
                    max_args: config.max_args,
                },
                max_pending_output: config.max_pending_output,
            },
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve forever. Returns only on a poll failure.
    pub fn run(mut self) -> io::Result<()> {
        loop {
            self.run_once()?;
        }
    }

    /// Wait for readiness once and handle every reported event.
    fn run_once(&mut self) -> io::Result<()> {
        match self.poll.poll(&mut self.events, None) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_connections(&self.listener, &self.poll, &mut self.connections);
                }
                Token(raw) => {
                    handle_connection_event(
                        ConnId::from_usize(raw),
                        readiness(event),
                        &self.poll,
                        &mut self.connections,
                        &mut self.store,
                        &mut self.scratch,
                        &self.conn_config,
                    );
                }
            }
        }
        Ok(())
    }
}

fn readiness(event: &Event) -> Readiness {
    Readiness {
        readable: event.is_readable() || event.is_read_closed(),
        writable: event.is_writable() || event.is_write_closed(),
        error: event.is_error(),
    }
}

fn interest(intents: Intents) -> Interest {
    match (intents.read, intents.write) {
        (true, true) => Interest::READABLE | Interest::WRITABLE,
        (false, true) => Interest::WRITABLE,
        _ => Interest::READABLE,
    }
}

fn accept_connections(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let id = match connections.insert(Connection::new(stream)) {
                    Some(id) => id,
                    None => {
                        warn!(
                            peer = %peer_addr,
                            limit = connections.capacity(),
                            "Connection limit reached"
                        );
                        continue;
                    }
                };

                let registered = match connections.get_mut(id) {
                    Some(conn) => poll.registry().register(
                        &mut conn.stream,
                        Token(id.as_usize()),
                        Interest::READABLE,
                    ),
                    None => continue,
                };
                if let Err(e) = registered {
                    error!(peer = %peer_addr, error = %e, "Failed to register connection");
                    connections.remove(id);
                    continue;
                }

                debug!(
                    conn = id.as_usize(),
                    peer = %peer_addr,
                    active = connections.len(),
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
}

fn handle_connection_event(
    id: ConnId,
    ready: Readiness,
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    store: &mut Store,
    scratch: &mut [u8],
    config: &ConnConfig,
) {
    // Stale token for a connection closed earlier in this batch.
    let Some(conn) = connections.get_mut(id) else {
        return;
    };

    let before = conn.intents();
    let after = conn.on_ready(ready, scratch, store, config);

    let keep = if after.close {
        false
    } else if interest(after) != interest(before) {
        match poll
            .registry()
            .reregister(&mut conn.stream, Token(id.as_usize()), interest(after))
        {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = id.as_usize(), error = %e, "Failed to re-register connection");
                false
            }
        }
    } else {
        true
    };

    if !keep {
        close_connection(poll, connections, id);
    }
}

fn close_connection(poll: &Poll, connections: &mut ConnectionRegistry<TcpStream>, id: ConnId) {
    if let Some(mut conn) = connections.remove(id) {
        let _ = poll.registry().deregister(&mut conn.stream);
        debug!(
            conn = id.as_usize(),
            active = connections.len(),
            "Connection closed"
        );
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR and the system's
/// maximum backlog.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(libc::SOMAXCONN)?;

    Ok(socket.into())
}
