//! JSON codec using `serde_json`.

use super::Codec;
use crate::error::Result;

/// JSON codec. Larger on the wire than MsgPack but readable in captures.
pub struct JsonCodec;

impl Codec for JsonCodec {
    const NAME: &'static str = "json";

    #[inline]
    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    #[inline]
    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
