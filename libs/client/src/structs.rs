//! Typed struct topics layered over the registry.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tether_core::{Payload, WireType};
use tether_fabric::codec::{BincodeCodec, Codec};
use tracing::warn;

use crate::dispatch::ValueCallback;
use crate::error::{Error, Result};
use crate::registry::{TopicKind, TopicRegistry};

/// A structured value carried whole over one topic
///
/// `Default` supplies the instance announced with a new subscription and
/// returned before any data arrives.
pub trait StructType: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Schema name announced as `struct:<TYPE_ID>`
    const TYPE_ID: &'static str;
}

/// Encode and decode [`StructType`] values on registry topics
pub struct StructTopics {
    registry: Arc<TopicRegistry>,
    codec: BincodeCodec,
}

impl StructTopics {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            registry,
            codec: BincodeCodec,
        }
    }

    fn kind<T: StructType>() -> TopicKind {
        TopicKind::Struct(T::TYPE_ID.to_string())
    }

    pub fn encode<T: StructType>(&self, value: &T) -> Result<Payload> {
        Ok(Payload::Struct {
            type_id: T::TYPE_ID.to_string(),
            bytes: self.codec.encode(value)?,
        })
    }

    /// Decode a payload written for `T`; `None` for any other payload
    pub fn decode<T: StructType>(&self, payload: &Payload) -> Option<T> {
        decode_with(&self.codec, payload)
    }

    /// Subscribe `path` as a `T` topic; `callback` gets each decoded update
    pub fn subscribe<T, F>(&self, path: &str, callback: Option<F>) -> Result<bool>
    where
        T: StructType,
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        let default = self.encode(&T::default())?;
        let callback = callback.map(|callback| self.listener::<T, F>(callback));
        self.registry.bind_subscriber(
            path,
            Self::kind::<T>(),
            WireType::Struct(T::TYPE_ID.to_string()),
            Some(default),
            callback,
        )
    }

    /// Attach a typed listener to an existing struct topic
    pub fn add_listener<T, F>(&self, path: &str, callback: F)
    where
        T: StructType,
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        self.registry
            .add_listener(path, self.listener::<T, F>(callback));
    }

    fn listener<T, F>(&self, callback: F) -> ValueCallback
    where
        T: StructType,
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        let codec = self.codec;
        Arc::new(move |path: &str, payload: &Payload| {
            if let Some(value) = decode_with::<T>(&codec, payload) {
                callback(path, &value);
            }
        })
    }

    /// Latest `T` on `path`, or `T::default()` before any data
    ///
    /// `None` when `path` is not subscribed as a `T` topic. Undecodable
    /// data reads as the default.
    pub fn get<T: StructType>(&self, path: &str) -> Option<T> {
        let payload = self.registry.read(path, &Self::kind::<T>())?;
        Some(self.decode(&payload).unwrap_or_default())
    }

    /// Encode `value` and write it to the `T` topic at `path`
    pub fn publish<T: StructType>(&self, path: &str, value: &T) -> Result<()> {
        let publisher = match self.registry.bind_publisher(path, Self::kind::<T>(), || {
            WireType::Struct(T::TYPE_ID.to_string())
        }) {
            Ok(publisher) => publisher,
            Err(Error::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };
        publisher.write(self.encode(value)?);
        Ok(())
    }
}

fn decode_with<T: StructType>(codec: &BincodeCodec, payload: &Payload) -> Option<T> {
    match payload {
        Payload::Struct { type_id, bytes } if type_id == T::TYPE_ID => match codec.decode(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(type_id = T::TYPE_ID, error = %e, "undecodable struct payload");
                None
            }
        },
        _ => None,
    }
}
