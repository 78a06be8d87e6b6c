//! Wire format encoding and decoding.
//!
//! Implements the 12-byte frame header:
//! ```text
//! ┌─────────────────────┬──────────┐
//! │ Sequence            │ Length   │
//! │ 8 bytes             │ 4 bytes  │
//! │ uint64 BE           │ uint32 BE│
//! └─────────────────────┴──────────┘
//! ```
//!
//! The header is followed by exactly `length` payload bytes holding one
//! encoded message. The sequence number is only for tracing; request ids
//! carried inside the message do the correlation.

use crate::error::{MemstateError, Result};

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Per-direction frame counter, starting at 1.
    pub sequence: u64,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(sequence: u64, payload_length: u32) -> Self {
        Self {
            sequence,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use memstate_client::protocol::Header;
    ///
    /// let header = Header::new(7, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 12);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use memstate_client::protocol::Header;
    ///
    /// let bytes = [0, 0, 0, 0, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.sequence, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let sequence = u64::from_be_bytes(buf.get(0..8)?.try_into().ok()?);
        let payload_length = u32::from_be_bytes(buf.get(8..12)?.try_into().ok()?);
        Some(Self {
            sequence,
            payload_length,
        })
    }

    /// Reject payload lengths above `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(MemstateError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }
}
