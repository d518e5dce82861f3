//! Command dispatch against the key-value store.

use bytes::Bytes;
use tracing::trace;

use crate::storage::Store;

/// Response status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    Error = 1,
    NotFound = 2,
}

impl Status {
    #[cfg(test)]
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            2 => Some(Status::NotFound),
            _ => None,
        }
    }
}

/// A status-tagged response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub payload: Bytes,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            payload: Bytes::new(),
        }
    }

    pub fn value(payload: Bytes) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    pub fn error() -> Self {
        Self {
            status: Status::Error,
            payload: Bytes::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: Bytes::new(),
        }
    }
}

/// Parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes },
    Del { key: Bytes },
    /// Unknown verb or wrong number of arguments.
    Unknown,
}

impl Command {
    /// Interpret an argument list. Verbs are matched exactly.
    pub fn from_args(args: Vec<Bytes>) -> Self {
        let mut args = args.into_iter();
        let verb = args.next();
        match (verb.as_deref(), args.next(), args.next(), args.next()) {
            (Some(b"get"), Some(key), None, None) => Command::Get { key },
            (Some(b"set"), Some(key), Some(value), None) => Command::Set { key, value },
            (Some(b"del"), Some(key), None, None) => Command::Del { key },
            _ => Command::Unknown,
        }
    }
}

/// Execute a command against the store.
pub fn execute(command: Command, store: &mut Store) -> Response {
    match command {
        Command::Get { key } => match store.get(&key) {
            Some(value) => {
                trace!(key = ?key, len = value.len(), "get hit");
                Response::value(value)
            }
            None => {
                trace!(key = ?key, "get miss");
                Response::not_found()
            }
        },
        Command::Set { key, value } => {
            trace!(key = ?key, len = value.len(), "set");
            store.set(key, value);
            trace!(keys = store.len(), "store size");
            Response::ok()
        }
        Command::Del { key } => {
            let removed = store.delete(&key);
            trace!(key = ?key, removed, "del");
            Response::ok()
        }
        Command::Unknown => Response::error(),
    }
}

/// Interpret and execute one request.
pub fn dispatch(args: Vec<Bytes>, store: &mut Store) -> Response {
    execute(Command::from_args(args), store)
}
