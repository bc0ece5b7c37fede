//! JSON Codec using `serde_json`

use crate::error::CacheError;
use crate::traits::CacheCodec;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON Codec using `serde_json`
///
/// Entries written through this codec are plain JSON, so a distributed store
/// shared with other tooling stays readable.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::Codec(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Codec(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}
