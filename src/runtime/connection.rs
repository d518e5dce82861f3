//! Connection state machine for managing TCP connections.
//!
//! Each connection declares what it wants from the event loop through its
//! `Intents`. The event loop only translates readiness into calls to
//! `handle_readable`/`handle_writable` and intents back into poll interest,
//! so everything here works against any `Read + Write` stream.

use crate::protocols::kv::Limits;
use crate::runtime::request::process_all;
use crate::runtime::Buffer;
use crate::storage::Store;
use slab::Slab;
use std::io::{self, Read, Write};
use tracing::{debug, warn};

/// What a connection wants the event loop to do next.
///
/// `close` overrides the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intents {
    pub read: bool,
    pub write: bool,
    pub close: bool,
}

impl Intents {
    /// State of a freshly accepted connection.
    pub fn reading() -> Self {
        Self {
            read: true,
            write: false,
            close: false,
        }
    }

    fn writing() -> Self {
        Self {
            read: false,
            write: true,
            close: false,
        }
    }
}

/// Readiness reported by the poller for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Per-connection processing settings shared by every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnConfig {
    pub limits: Limits,
    /// Close the connection if unsent output grows past this (0 = unbounded).
    pub max_pending_output: usize,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    pub stream: S,
    intents: Intents,
    /// Bytes received but not yet parsed into a frame.
    incoming: Buffer,
    /// Encoded responses not yet written.
    outgoing: Buffer,
}

impl<S: Read + Write> Connection<S> {
    /// Create a new connection in initial reading state.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            intents: Intents::reading(),
            incoming: Buffer::new(),
            outgoing: Buffer::new(),
        }
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    /// Mark connection for closing.
    pub fn close(&mut self) {
        self.intents.close = true;
    }

    /// Handle one readiness notification and return the resulting intents.
    ///
    /// A reported error closes the connection once read and write
    /// handling for this notification is done.
    pub fn on_ready(
        &mut self,
        ready: Readiness,
        scratch: &mut [u8],
        store: &mut Store,
        config: &ConnConfig,
    ) -> Intents {
        if ready.readable {
            self.handle_readable(scratch, store, config);
        }
        if ready.writable {
            // Input queued behind a flushed response has no edge left to
            // report it, so read again whenever a flush returns to reading.
            while self.intents.write && !self.intents.close {
                self.handle_writable();
                if !self.intents.read || self.intents.close {
                    break;
                }
                self.handle_readable(scratch, store, config);
            }
        }
        if ready.error {
            self.close();
        }
        self.intents
    }

    /// Read until the socket would block, answering every complete frame.
    ///
    /// Stops early once there is output to flush or the connection wants
    /// to close. `scratch` is the per-loop read buffer.
    pub fn handle_readable(
        &mut self,
        scratch: &mut [u8],
        store: &mut Store,
        config: &ConnConfig,
    ) {
        while self.intents.read && !self.intents.close {
            let n = match self.stream.read(scratch) {
                Ok(0) => {
                    if self.incoming.is_empty() {
                        debug!("client closed");
                    } else {
                        debug!(pending = self.incoming.len(), "unexpected eof");
                    }
                    self.close();
                    return;
                }
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "read error");
                    self.close();
                    return;
                }
            };

            self.incoming.append(&scratch[..n]);
            if let Err(e) = process_all(
                &mut self.incoming,
                &mut self.outgoing,
                store,
                &config.limits,
            ) {
                warn!(error = %e, "protocol error");
                self.close();
                return;
            }

            if config.max_pending_output > 0 && self.outgoing.len() > config.max_pending_output {
                warn!(
                    pending = self.outgoing.len(),
                    limit = config.max_pending_output,
                    "output limit exceeded"
                );
                self.close();
                return;
            }

            self.intents = if self.outgoing.is_empty() {
                Intents::reading()
            } else {
                Intents::writing()
            };
        }
    }

    /// Write pending output until it is flushed or the socket would block.
    pub fn handle_writable(&mut self) {
        while self.intents.write && !self.intents.close {
            if self.outgoing.is_empty() {
                self.intents = Intents::reading();
                return;
            }

            match self.stream.write(self.outgoing.data()) {
                Ok(0) => {
                    debug!("write returned 0");
                    self.close();
                    return;
                }
                Ok(n) => {
                    self.outgoing.consume(n);
                    self.intents = if self.outgoing.is_empty() {
                        Intents::reading()
                    } else {
                        Intents::writing()
                    };
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "write error");
                    self.close();
                    return;
                }
            }
        }
    }
}

/// Number of low token bits holding the slab slot.
#[cfg(target_pointer_width = "64")]
const SLOT_BITS: u32 = 32;
#[cfg(not(target_pointer_width = "64"))]
const SLOT_BITS: u32 = 24;

const SLOT_MASK: usize = (1 << SLOT_BITS) - 1;

/// Highest generation, chosen so no id ever equals `usize::MAX`.
const MAX_GENERATION: usize = (usize::MAX >> SLOT_BITS) - 1;

/// Generation-stamped connection identifier.
///
/// The slot is reused after a connection closes but the generation
/// advances, so an id held past its connection's lifetime does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(usize);

impl ConnId {
    fn new(slot: usize, generation: usize) -> Self {
        Self((generation << SLOT_BITS) | slot)
    }

    fn slot(self) -> usize {
        self.0 & SLOT_MASK
    }

    fn generation(self) -> usize {
        self.0 >> SLOT_BITS
    }

    /// Raw value, used as the poll token.
    pub fn as_usize(self) -> usize {
        self.0
    }

    pub fn from_usize(raw: usize) -> Self {
        Self(raw)
    }
}

#[derive(Debug)]
struct Entry<S> {
    generation: usize,
    conn: Connection<S>,
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<S> {
    connections: Slab<Entry<S>>,
    max_connections: usize,
    next_generation: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        let max_connections = max_connections.min(SLOT_MASK);
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
            next_generation: 0,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Option<ConnId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        let generation = self.next_generation;
        self.next_generation = if generation == MAX_GENERATION {
            0
        } else {
            generation + 1
        };
        let slot = self.connections.insert(Entry { generation, conn });
        Some(ConnId::new(slot, generation))
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<S>> {
        self.connections
            .get_mut(id.slot())
            .filter(|entry| entry.generation == id.generation())
            .map(|entry| &mut entry.conn)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection<S>> {
        match self.connections.get(id.slot()) {
            Some(entry) if entry.generation == id.generation() => {
                Some(self.connections.remove(id.slot()).conn)
            }
            _ => None,
        }
    }

    /// Number of active connections.
    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}
