//! Length-prefixed binary key-value protocol.
//!
//! Every message is a frame: a little-endian `u32` payload length followed
//! by that many payload bytes.
//!
//! ## Protocol Format
//!
//! ```text
//! Request payload:  [u32 argc] argc * ([u32 len] [len bytes])
//! Response payload: [u32 status] [value bytes for a successful get]
//! ```
//!
//! Commands are `get <key>`, `set <key> <value>` and `del <key>`. Status
//! codes are `0` (ok), `1` (error) and `2` (not found).
//!
//! A frame announcing more than the payload limit, more arguments than the
//! argument limit, an argument that runs past the payload or trailing bytes
//! after the last argument is a protocol violation; the connection is closed
//! and the frame is never answered.

pub mod handler;
pub mod parser;

pub use handler::{dispatch, Response};
pub use parser::Limits;
