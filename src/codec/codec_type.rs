use super::CodecError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::str::FromStr;

/// Identifies the codec a connection speaks after the handshake.
///
/// The string form is what travels in the handshake, so new variants must
/// keep existing identifiers stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecType {
    /// Length-prefixed `bitcode` frames.
    #[default]
    #[serde(rename = "application/bitcode")]
    Bitcode,

    /// Newline-delimited JSON documents.
    #[serde(rename = "application/json")]
    Json,
}

impl CodecType {
    pub const fn as_str(self) -> &'static str {
        match self {
            CodecType::Bitcode => "application/bitcode",
            CodecType::Json => "application/json",
        }
    }

    /// Serializes a value with this codec's format.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecType::Bitcode => {
                bitcode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
            }
            CodecType::Json => {
                serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
            }
        }
    }

    /// Deserializes a value previously produced by [`CodecType::encode`].
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            CodecType::Bitcode => {
                bitcode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
            CodecType::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application/bitcode" => Ok(CodecType::Bitcode),
            "application/json" => Ok(CodecType::Json),
            other => Err(other.to_string()),
        }
    }
}
