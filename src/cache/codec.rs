use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CacheError;

/// How snapshots are encoded before they reach a backend.
///
/// `Binary` is bitcode wrapped in base64 so string-valued backends can hold it.
/// It is not self-describing: records cached this way must not use
/// `skip_serializing_if`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCodec {
    #[default]
    Json,
    Binary,
}

impl CacheCodec {
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<String, CacheError> {
        match self {
            CacheCodec::Json => Ok(serde_json::to_string(value)?),
            CacheCodec::Binary => {
                let bytes = bitcode::serialize(value)?;
                Ok(STANDARD.encode(bytes))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(self, raw: &str) -> Result<T, CacheError> {
        match self {
            CacheCodec::Json => Ok(serde_json::from_str(raw)?),
            CacheCodec::Binary => {
                let bytes = STANDARD.decode(raw)?;
                Ok(bitcode::deserialize(&bytes)?)
            }
        }
    }
}
