//! Wire framing: `varint(header_len) . header_bytes . payload`.
//!
//! `varint` is the standard unsigned base-128 varint (protobuf-compatible,
//! little-endian group order). The header itself is an encoded
//! [`FrameHeader`] with exactly three fields: `service_name`, `method_name`,
//! `args_size`. `args_size` must equal the length of the payload that
//! follows the header.
//!
//! [`FrameDecoder`] is a stateful, per-connection accumulator: a reactor
//! feeds it raw bytes as they arrive and polls [`FrameDecoder::try_parse`]
//! after each read. A frame whose bytes haven't fully arrived yet reports
//! "need more bytes" (`Ok(None)`) rather than an error, so one TCP read
//! never has to line up with one frame.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};
use crate::message::Message;

/// Maximum varint length accepted for a header-length prefix. Five groups
/// of 7 bits covers any `u32`; anything longer is a malformed stream.
const MAX_VARINT_BYTES: usize = 5;

/// The RPC request header: which service, which method, how large the
/// payload that follows is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameHeader {
    pub service_name: String,
    pub method_name: String,
    pub args_size: u32,
}

impl FrameHeader {
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>, args_size: u32) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            args_size,
        }
    }
}

/// Encodes a varint-prefixed header followed by the caller-supplied
/// payload into a single request frame.
pub fn encode_request(header: &FrameHeader, payload: &[u8]) -> Result<Bytes> {
    let header_bytes = header.encode()?;
    let mut out = BytesMut::with_capacity(MAX_VARINT_BYTES + header_bytes.len() + payload.len());
    encode_varint_u32(header_bytes.len() as u32, &mut out);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

/// Writes `value` to `out` as an unsigned base-128 varint.
pub fn encode_varint_u32(mut value: u32, out: &mut BytesMut) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.extend_from_slice(&[byte]);
            break;
        }
        out.extend_from_slice(&[byte | 0x80]);
    }
}

/// Result of attempting to parse a varint from a byte slice.
enum VarintParse {
    /// Fully parsed: the value and the number of bytes it consumed.
    Complete(u32, usize),
    /// Not enough bytes yet to know where the varint ends.
    Incomplete,
    /// More than [`MAX_VARINT_BYTES`] continuation bytes seen; the stream
    /// is corrupt, not merely partial.
    Invalid,
}

fn parse_varint_u32(buf: &[u8]) -> VarintParse {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_BYTES) {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return VarintParse::Complete(value, i + 1);
        }
    }
    if buf.len() >= MAX_VARINT_BYTES {
        VarintParse::Invalid
    } else {
        VarintParse::Incomplete
    }
}

/// Accumulates bytes from a connection and yields complete frames as they
/// become available, buffering partial frames across reactor events.
///
/// - Why: a single `TcpStream::read` has no relationship to a single
///   frame — the kernel hands back whatever arrived, which may be half a
///   header, three frames back to back, or anything in between. Pushing
///   the accumulation logic in here keeps that fact out of the accept
///   loop, which just pushes bytes and polls.
/// - What: `push` appends, `try_parse` attempts to slice one frame off
///   the front of the buffer. Calling `try_parse` in a loop after every
///   `push` drains as many complete frames as are currently buffered.
/// - Trade-offs: the buffer only grows by `split_to`/`split_off`, which
///   on `BytesMut` reuses the same allocation rather than copying — but
///   there's no cap on how large `buf` can grow before a full frame
///   arrives, so a peer that never completes a frame leaks memory for the
///   life of the connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Appends freshly-read bytes to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to pull one complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed, `Ok(Some(_))` when a
    /// full frame was consumed, and `Err` only for a structurally invalid
    /// stream (e.g. a varint that never terminates).
    pub fn try_parse(&mut self) -> Result<Option<(FrameHeader, Bytes)>> {
        let (header_len, varint_len) = match parse_varint_u32(&self.buf) {
            VarintParse::Complete(v, n) => (v as usize, n),
            VarintParse::Incomplete => return Ok(None),
            VarintParse::Invalid => {
                return Err(RpcError::MalformedFrame {
                    reason: "header length varint exceeds 5 bytes".into(),
                });
            }
        };

        let header_end = varint_len + header_len;
        if self.buf.len() < header_end {
            return Ok(None);
        }

        let header = FrameHeader::decode(&self.buf[varint_len..header_end])
            .map_err(|_| RpcError::MalformedFrame { reason: "header did not decode".into() })?;

        let payload_end = header_end + header.args_size as usize;
        if self.buf.len() < payload_end {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(payload_end);
        let payload = frame.split_off(header_end);
        Ok(Some((header, payload.freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_payload() {
        let header = FrameHeader::new("Cache", "Get", 3);
        let frame = encode_request(&header, b"abc").unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&frame);
        let (decoded_header, payload) = decoder.try_parse().unwrap().expect("frame ready");
        assert_eq!(decoded_header, header);
        assert_eq!(&payload[..], b"abc");
    }

    #[test]
    fn reports_need_more_on_truncated_frame() {
        let header = FrameHeader::new("Cache", "Get", 3);
        let frame = encode_request(&header, b"abc").unwrap();

        for cut in 1..frame.len() {
            let mut decoder = FrameDecoder::new();
            decoder.push(&frame[..cut]);
            assert!(decoder.try_parse().unwrap().is_none(), "cut at {cut} should need more bytes");
        }
    }

    #[test]
    fn feeds_incrementally_across_pushes() {
        let header = FrameHeader::new("User", "Login", 5);
        let frame = encode_request(&header, b"hello").unwrap();
        let mut decoder = FrameDecoder::new();

        let mut result = None;
        for byte in frame.iter() {
            decoder.push(&[*byte]);
            if let Some(found) = decoder.try_parse().unwrap() {
                result = Some(found);
                break;
            }
        }
        let (decoded_header, payload) = result.expect("frame eventually completes");
        assert_eq!(decoded_header, header);
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn varint_round_trips_multibyte_values() {
        for value in [0u32, 1, 127, 128, 300, 16384, u32::MAX] {
            let mut buf = BytesMut::new();
            encode_varint_u32(value, &mut buf);
            match parse_varint_u32(&buf) {
                VarintParse::Complete(decoded, len) => {
                    assert_eq!(decoded, value);
                    assert_eq!(len, buf.len());
                }
                _ => panic!("expected complete varint for {value}"),
            }
        }
    }
}
