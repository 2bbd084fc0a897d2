// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure encoding or decoding a value through a [`Codec`].
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

/// Encodes and decodes values of one user type for transport over a
/// synapse. Implementations are expected to be cheap to clone/share and
/// are looked up by [`Codec::name`], which becomes part of a neuron's
/// derived channel name.
pub trait Codec<T>: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Reference codec carrying any `Serialize + DeserializeOwned` type as
/// UTF-8 JSON. Not part of the core fabric; provided so callers and tests
/// have a concrete codec to exercise without pulling in a project-specific
/// serialization scheme.
pub struct JsonCodec<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
    }
}

/// Reference identity codec over `String`, for channels that carry
/// already-textual payloads rather than a structured type.
pub struct StringCodec {
    name: String,
}

impl StringCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Codec<String> for StringCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &String) -> Result<Vec<u8>, CodecError> {
        Ok(value.clone().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec::<Sample>::new("json");
        let value = Sample {
            a: 7,
            b: "hi".into(),
        };
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn string_codec_round_trips() {
        let codec = StringCodec::new("string");
        let bytes = codec.encode(&"hello".to_string()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), "hello");
    }

    #[test]
    fn string_codec_rejects_invalid_utf8() {
        let codec = StringCodec::new("string");
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
    }
}
