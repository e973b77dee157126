//! Tether Core - Protocol value model and marshalling
//!
//! Defines the tagged [`Value`] union carried by topics, the [`WireType`]
//! tags announced on the wire, and the [`marshal`] layer that converts
//! dynamically typed application values (`serde_json::Value`) to and from
//! protocol values.
//!
//! # Example
//!
//! ```
//! use tether_core::{marshal, Value, WireType};
//! use serde_json::json;
//!
//! let native = json!([1.0, 2.0]);
//! assert_eq!(marshal::infer_wire_type(&native), WireType::DoubleArray);
//!
//! let value = marshal::encode(&native);
//! assert_eq!(value, Value::DoubleArray(vec![1.0, 2.0]));
//! assert_eq!(marshal::decode(&value), native);
//! ```

pub mod error;
pub mod marshal;
pub mod value;

// Re-exports for convenience
pub use error::{Error, Result};
pub use value::{Direction, Payload, Topic, Value, WireType};
