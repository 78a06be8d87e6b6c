//! Codec module - serialization of messages and payload bodies.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (default)
//! - [`JsonCodec`] - JSON using `serde_json`, handy when inspecting traffic
//!
//! # Design
//!
//! Codecs are marker types implementing [`Codec`] with associated functions
//! rather than trait objects. The client is generic over its codec, so the
//! choice is made at compile time and both peers must agree on it. The same
//! codec encodes the [`Message`](crate::message::Message) envelope and the
//! user payloads carried inside it.
//!
//! # Example
//!
//! ```
//! use memstate_client::codec::{Codec, JsonCodec, MsgPackCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let encoded = JsonCodec::encode(&[1, 2, 3]).unwrap();
//! assert_eq!(encoded, b"[1,2,3]");
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialization capability shared by both ends of a connection.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in log output.
    const NAME: &'static str;

    /// Encode a value to bytes.
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
