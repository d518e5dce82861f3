//! Protocol implementations.
//!
//! Each protocol has a parser module used by the runtime event loop and a
//! handler module that executes parsed requests.
//!
//! - `kv`: length-prefixed binary get/set/del protocol

pub mod kv;
