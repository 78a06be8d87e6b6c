//! Async frame reader over any `AsyncRead`.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Frame, FrameBuffer};
use crate::error::{MemstateError, Result};

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads whole frames from a byte stream.
///
/// Wraps a [`FrameBuffer`] so frames can be pulled one at a time, even when a
/// single socket read delivers several of them.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with the default payload limit.
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, FrameBuffer::new())
    }

    /// Create a reader with a custom payload limit.
    pub fn with_max_payload(reader: R, max_payload_size: u32) -> Self {
        Self::with_buffer(reader, FrameBuffer::with_max_payload(max_payload_size))
    }

    fn with_buffer(reader: R, buffer: FrameBuffer) -> Self {
        Self {
            reader,
            buffer,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    ///
    /// # Errors
    ///
    /// - [`MemstateError::Protocol`] if the stream ends mid-frame or a header
    ///   announces an oversize payload
    /// - [`MemstateError::Io`] on read failure
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.buffer.try_extract_one()? {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.buffer.has_partial_frame() {
                    return Err(MemstateError::Protocol(format!(
                        "stream ended inside a frame ({} bytes buffered)",
                        self.buffer.len()
                    )));
                }
                return Ok(None);
            }

            self.buffer.extend(&self.chunk[..n]);
        }
    }
}
