//! Extracted item records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Specification data attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum SpecsStatus {
    /// Specification map fetched for the record's derivative id
    Available(Map<String, Value>),
    /// No derivative id was present, so no specification fetch was made
    Unavailable,
}

impl SpecsStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// One successfully extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Site identifier of the item
    pub item_id: String,

    /// Price exactly as listed
    pub price: String,

    /// Price normalized to a number
    pub price_value: f64,

    pub description: String,

    /// Raw image payloads, at most the configured count
    #[serde(with = "base64_payloads")]
    pub images: Vec<Vec<u8>>,

    /// Structured attribute map
    pub attributes: Map<String, Value>,

    pub specs: SpecsStatus,

    /// Correlation token the record was fetched with
    pub session_id: String,
}

/// Serializes byte payloads as base64 strings in JSON batches
mod base64_payloads {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payloads: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(payloads.iter().map(|bytes| STANDARD.encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| STANDARD.decode(s).map_err(de::Error::custom))
            .collect()
    }
}
