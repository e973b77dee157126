use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

pub mod bincode;

pub use self::bincode::BincodeCodec;

/// Codec trait for serializing and deserializing frames and struct payloads
pub trait Codec: Send + Sync {
    /// Encode a value into bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value
    ///
    /// Bytes left over after decoding are an error, so a payload written
    /// for one type is not silently read as a shorter one.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}
