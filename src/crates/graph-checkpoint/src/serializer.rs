//! Codecs used by stores to persist checkpoints and metadata
//!
//! Stores take a codec at construction time instead of reaching for a global
//! default. [`JsonSerializer`] is the built-in default: a structural round trip
//! through JSON. Cyclic value graphs cannot be encoded by either codec.
//!
//! | Codec | Format | Channel values |
//! |-------|--------|----------------|
//! | [`JsonSerializer`] | `json` | any `Serialize` type, including `serde_json::Value` |
//! | [`BincodeSerializer`] | `bincode` | concrete types only, empty `extra` metadata |

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Encode/decode contract for stored checkpoint data
pub trait SerializerProtocol: Send + Sync {
    /// Short format name, recorded in logs
    fn format(&self) -> &'static str;

    /// Encode a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a value from bytes
    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;

    /// Encode to a JSON value, for backends with a native JSON column
    fn dumps_json<T: Serialize>(&self, value: &T) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Decode from a JSON value
    fn loads_json<T: DeserializeOwned>(&self, value: &serde_json::Value) -> Result<T> {
        Ok(serde::Deserialize::deserialize(value)?)
    }
}

/// JSON codec (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create the JSON codec
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn format(&self) -> &'static str {
        "json"
    }

    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Compact binary codec
///
/// bincode is not self-describing: channel values must be concrete types
/// rather than `serde_json::Value`, and custom metadata (`extra`) must stay
/// empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    /// Create the bincode codec
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for BincodeSerializer {
    fn format(&self) -> &'static str {
        "bincode"
    }

    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, CheckpointMetadata};
    use crate::error::CheckpointError;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_json_checkpoint_round_trip() {
        let codec = JsonSerializer::new();
        let mut checkpoint: Checkpoint = Checkpoint::empty();
        checkpoint.write_channel("messages", json!([{"role": "user", "content": "hi"}]));
        checkpoint.mark_seen("agent", "messages");

        let bytes = codec.dumps(&checkpoint).unwrap();
        let restored: Checkpoint = codec.loads(&bytes).unwrap();

        assert_eq!(restored, checkpoint);
        assert_eq!(codec.format(), "json");
    }

    #[test]
    fn test_bincode_typed_values() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Counter {
            total: i64,
        }

        let codec = BincodeSerializer::new();
        let mut checkpoint: Checkpoint<Counter> = Checkpoint::empty();
        checkpoint.write_channel("counter", Counter { total: 3 });
        let metadata = CheckpointMetadata::loop_step(0).with_write("adder", Counter { total: 3 });

        let restored: Checkpoint<Counter> = codec.loads(&codec.dumps(&checkpoint).unwrap()).unwrap();
        let restored_meta: CheckpointMetadata<Counter> =
            codec.loads(&codec.dumps(&metadata).unwrap()).unwrap();

        assert_eq!(restored, checkpoint);
        assert_eq!(restored_meta, metadata);
    }

    #[test]
    fn test_metadata_as_json_value() {
        let codec = JsonSerializer::new();
        let metadata: CheckpointMetadata = CheckpointMetadata::input().with_extra("k", json!(1));

        let value = codec.dumps_json(&metadata).unwrap();
        assert_eq!(value["source"], json!("input"));
        assert_eq!(value["step"], json!(-1));

        let restored: CheckpointMetadata = codec.loads_json(&value).unwrap();
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_corrupt_bytes_surface_as_error() {
        let result: Result<Checkpoint> = JsonSerializer::new().loads(b"{not json");
        assert!(matches!(result, Err(CheckpointError::Serialization(_))));

        let result: Result<Checkpoint<u32>> = BincodeSerializer::new().loads(&[0xff]);
        assert!(matches!(result, Err(CheckpointError::BinarySerialization(_))));
    }
}
