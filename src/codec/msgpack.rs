//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named` so structs travel as maps keyed by field
//! name. Positional encoding would tie the wire format to field order on both
//! peers.

use super::Codec;
use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    #[inline]
    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
