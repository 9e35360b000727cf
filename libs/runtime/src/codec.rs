//! Message and state serialization.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SerializerKind;
use crate::error::CodecError;

/// Converts values to and from bytes at a transport or store boundary.
pub trait MessageSerializer: Send + Sync + 'static {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// A payload that does not decode as `T` is reported, never skipped.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// serde_json-backed serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl From<SerializerKind> for JsonSerializer {
    fn from(kind: SerializerKind) -> Self {
        match kind {
            SerializerKind::Json => JsonSerializer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonSerializer;
        let reading = Reading {
            sensor: "temp".into(),
            value: 21.5,
        };
        let bytes = codec.serialize(&reading).unwrap();
        assert_eq!(codec.deserialize::<Reading>(&bytes).unwrap(), reading);
    }

    #[test]
    fn test_decode_wrong_shape_is_error() {
        let codec = JsonSerializer;
        let bytes = codec.serialize(&"just a string").unwrap();
        let err = codec.deserialize::<Reading>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
