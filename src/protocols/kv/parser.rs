//! Length-prefixed request parser and response encoder.

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

use super::handler::Response;
#[cfg(test)]
use super::handler::Status;

/// Size of every length, count and status field on the wire.
pub const HEADER_LEN: usize = 4;

/// Largest payload a single frame may announce.
pub const MAX_PAYLOAD: usize = 32 << 20; // 32 MB

/// Largest argument count a single request may announce.
pub const MAX_ARGS: usize = 200 * 1000;

/// Safety ceilings applied to wire-supplied lengths and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_payload: usize,
    pub max_args: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
            max_args: MAX_ARGS,
        }
    }
}

/// A frame that can never be answered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("argument count {count} exceeds limit of {max}")]
    TooManyArgs { count: usize, max: usize },
    #[error("argument runs past the end of the payload")]
    Truncated,
    #[error("{0} trailing bytes after the last argument")]
    TrailingBytes(usize),
}

/// Parse result
#[derive(Debug, PartialEq)]
pub enum ParseResult {
    /// A full request with the number of input bytes it occupied.
    Complete(Vec<Bytes>, usize),
    /// Need more data
    Incomplete,
    /// Protocol violation, the connection must be closed.
    Error(ProtocolError),
}

/// Parse one request frame from the front of `input`.
pub fn parse(input: &[u8], limits: &Limits) -> ParseResult {
    if input.len() < HEADER_LEN {
        return ParseResult::Incomplete;
    }

    let mut header = &input[..HEADER_LEN];
    let len = header.get_u32_le() as usize;
    if len > limits.max_payload {
        return ParseResult::Error(ProtocolError::FrameTooLarge {
            len,
            max: limits.max_payload,
        });
    }

    let frame_len = HEADER_LEN + len;
    if input.len() < frame_len {
        return ParseResult::Incomplete;
    }

    match parse_request(&input[HEADER_LEN..frame_len], limits.max_args) {
        Ok(args) => ParseResult::Complete(args, frame_len),
        Err(e) => ParseResult::Error(e),
    }
}

/// Parse a complete request payload into its argument list.
pub fn parse_request(mut payload: &[u8], max_args: usize) -> Result<Vec<Bytes>, ProtocolError> {
    let count = read_u32(&mut payload)? as usize;
    if count > max_args {
        return Err(ProtocolError::TooManyArgs {
            count,
            max: max_args,
        });
    }

    // Every argument needs at least its length prefix, so a lying count
    // cannot force a large up-front allocation.
    let mut args = Vec::with_capacity(count.min(payload.len() / HEADER_LEN));
    while args.len() < count {
        let len = read_u32(&mut payload)? as usize;
        if payload.len() < len {
            return Err(ProtocolError::Truncated);
        }
        args.push(Bytes::copy_from_slice(&payload[..len]));
        payload.advance(len);
    }

    if !payload.is_empty() {
        return Err(ProtocolError::TrailingBytes(payload.len()));
    }
    Ok(args)
}

fn read_u32(cur: &mut &[u8]) -> Result<u32, ProtocolError> {
    if cur.remaining() < HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }
    Ok(cur.get_u32_le())
}

/// Length prefix and status of a response frame. The payload follows it
/// on the wire.
pub fn response_header(response: &Response) -> [u8; 2 * HEADER_LEN] {
    let mut header = [0u8; 2 * HEADER_LEN];
    let mut out = &mut header[..];
    out.put_u32_le((HEADER_LEN + response.payload.len()) as u32);
    out.put_u32_le(response.status as u32);
    header
}

/// Encode a request frame, as a client would.
#[cfg(test)]
pub fn encode_request<B: BufMut, A: AsRef<[u8]>>(args: &[A], out: &mut B) {
    let payload_len: usize = HEADER_LEN
        + args
            .iter()
            .map(|a| HEADER_LEN + a.as_ref().len())
            .sum::<usize>();
    out.put_u32_le(payload_len as u32);
    out.put_u32_le(args.len() as u32);
    for arg in args {
        out.put_u32_le(arg.as_ref().len() as u32);
        out.put_slice(arg.as_ref());
    }
}

/// Decode one response frame from the front of `input`.
///
/// Returns the status, payload and bytes consumed, or `None` if the frame
/// is incomplete or malformed.
#[cfg(test)]
pub fn decode_response(input: &[u8]) -> Option<(Status, Bytes, usize)> {
    let mut cur = input;
    let len = read_u32(&mut cur).ok()? as usize;
    if len < HEADER_LEN || cur.len() < len {
        return None;
    }
    let status = Status::from_u32(cur.get_u32_le())?;
    let payload = Bytes::copy_from_slice(&cur[..len - HEADER_LEN]);
    Some((status, payload, HEADER_LEN + len))
}
