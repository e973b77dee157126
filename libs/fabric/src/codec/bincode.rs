use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::frame::MAX_FRAME_LEN;

/// Bincode codec for binary serialization
///
/// Fixed-width integers, little endian, trailing bytes rejected on decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(MAX_FRAME_LEN as u64)
            .reject_trailing_bytes()
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Self::options()
            .serialize(value)
            .map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Self::options()
            .deserialize(bytes)
            .map_err(|e| Error::Codec(e.to_string()))
    }
}
