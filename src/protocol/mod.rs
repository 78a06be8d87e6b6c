//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the framing contract of the data stream:
//! - 12-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Async frame reader
//! - Sequence counter for outbound frames

mod frame;
mod frame_buffer;
mod reader;
mod sequence;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use reader::FrameReader;
pub use sequence::SequenceCounter;
pub use wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
