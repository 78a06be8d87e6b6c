//! Frame struct.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use memstate_client::protocol::{build_frame, FrameBuffer, Header};
//!
//! let bytes = build_frame(&Header::new(1, 5), b"hello");
//! let mut buffer = FrameBuffer::new();
//! buffer.extend(&bytes);
//! let frame = buffer.try_extract_one().unwrap().unwrap();
//!
//! assert_eq!(frame.sequence(), 1);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.header.sequence
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header's `payload_length` is taken from `payload`, not from `header`.
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(header.sequence, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
