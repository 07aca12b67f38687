//! The engine codec.

use crate::error::{CodecError, CodecResult};
use crate::framing::{decode_framed, encode_framed, FrameFlags};
use crate::type_map::TypeMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes and deserializes engine values as CBOR.
///
/// One `Codec` instance is shared by the journal, the snapshot path,
/// and the isolation layer, so every value crossing a persistence or
/// trust boundary goes through the same encoding.
#[derive(Debug, Default, Clone)]
pub struct Codec {
    type_map: TypeMap,
}

impl Codec {
    /// Creates a codec with an empty type map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec with the given type-identifier substitution map.
    #[must_use]
    pub fn with_type_map(type_map: TypeMap) -> Self {
        Self { type_map }
    }

    /// Returns the type-identifier substitution map.
    #[must_use]
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Encodes a value to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as CBOR.
    pub fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a value from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid CBOR for `T`.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }

    /// Produces a deep copy of a value by round-tripping it through the
    /// codec.
    ///
    /// The copy shares no allocations with the original: shared handles
    /// such as `Arc` are re-materialized as fresh values. This is the
    /// isolation primitive used when values cross the engine boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or decoded.
    pub fn deep_clone<T: Serialize + DeserializeOwned>(&self, value: &T) -> CodecResult<T> {
        let bytes = self.encode(value)?;
        self.decode(&bytes)
    }

    /// Encodes a value and wraps it in a packet frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the payload is too large
    /// for the frame's length field.
    pub fn encode_framed<T: Serialize>(&self, value: &T, flags: FrameFlags) -> CodecResult<Vec<u8>> {
        let payload = self.encode(value)?;
        encode_framed(&payload, flags)
    }

    /// Unwraps a packet frame and decodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is invalid, uses an unsupported
    /// option, fails its checksum, or the payload is not valid CBOR.
    pub fn decode_framed<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        let payload = decode_framed(bytes)?;
        self.decode(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        owner: String,
        balance: i64,
        tags: Vec<String>,
    }

    fn sample() -> Account {
        Account {
            owner: "alice".into(),
            balance: 1200,
            tags: vec!["premium".into(), "verified".into()],
        }
    }

    #[test]
    fn roundtrip_struct() {
        let codec = Codec::new();
        let bytes = codec.encode(&sample()).unwrap();
        let back: Account = codec.decode(&bytes).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn roundtrip_map() {
        let codec = Codec::new();
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u64);
        map.insert("b".to_string(), 2u64);

        let bytes = codec.encode(&map).unwrap();
        let back: HashMap<String, u64> = codec.decode(&bytes).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn decode_garbage_fails() {
        let codec = Codec::new();
        let result: CodecResult<Account> = codec.decode(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn deep_clone_is_equal_but_disjoint() {
        let codec = Codec::new();
        let original = Arc::new("shared".to_string());
        let copy: Arc<String> = codec.deep_clone(&original).unwrap();

        assert_eq!(*copy, *original);
        assert!(!Arc::ptr_eq(&copy, &original));
    }

    #[test]
    fn framed_roundtrip() {
        let codec = Codec::new();
        let bytes = codec.encode_framed(&sample(), FrameFlags::CHECKSUM).unwrap();
        let back: Account = codec.decode_framed(&bytes).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn framed_roundtrip_without_checksum() {
        let codec = Codec::new();
        let bytes = codec.encode_framed(&sample(), FrameFlags::empty()).unwrap();
        let back: Account = codec.decode_framed(&bytes).unwrap();
        assert_eq!(back, sample());
    }
}
