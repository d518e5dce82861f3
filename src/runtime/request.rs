//! Request processing for the runtime.
//!
//! Pulls one frame at a time out of a connection's input buffer, runs it
//! through the dispatcher and appends the encoded response to the output
//! buffer. Works on plain buffers, no socket required.

use crate::protocols::kv::parser::{self, Limits, ParseResult, ProtocolError};
use crate::protocols::kv::{dispatch, Response};
use crate::runtime::Buffer;
use crate::storage::Store;

/// Result of processing a buffer.
#[derive(Debug, PartialEq)]
pub enum ProcessResult {
    /// A frame was answered; call again to look for a pipelined one.
    Response,
    /// Need more data to complete the next frame.
    NeedData,
    /// Protocol violation, connection should be closed.
    Error(ProtocolError),
}

/// Try to process exactly one request frame from `input`.
pub fn try_one_request(
    input: &mut Buffer,
    output: &mut Buffer,
    store: &mut Store,
    limits: &Limits,
) -> ProcessResult {
    let (args, consumed) = match parser::parse(input.data(), limits) {
        ParseResult::Complete(args, consumed) => (args, consumed),
        ParseResult::Incomplete => return ProcessResult::NeedData,
        ParseResult::Error(e) => return ProcessResult::Error(e),
    };

    let response: Response = dispatch(args, store);
    output.append(&parser::response_header(&response));
    output.append(&response.payload);
    input.consume(consumed);
    ProcessResult::Response
}

/// Process every complete frame in `input`.
///
/// Returns the number of frames answered, or the protocol error that
/// stopped processing. Frames answered before the error stay in `output`.
pub fn process_all(
    input: &mut Buffer,
    output: &mut Buffer,
    store: &mut Store,
    limits: &Limits,
) -> Result<usize, ProtocolError> {
    let mut answered = 0;
    loop {
        match try_one_request(input, output, store, limits) {
            ProcessResult::Response => answered += 1,
            ProcessResult::NeedData => return Ok(answered),
            ProcessResult::Error(e) => return Err(e),
        }
    }
}
