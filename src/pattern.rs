use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};

/// One exact search/replace request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    /// Free-text label, only used in logs.
    #[serde(default)]
    pub description: String,
    #[serde(with = "hex_bytes")]
    pub search: Vec<u8>,
    /// Written over every match; same length as `search`.
    #[serde(with = "hex_bytes")]
    pub replace: Vec<u8>,
    /// Exact number of occurrences required in the payload.
    pub count: usize,
}

impl Pattern {
    pub fn new(
        description: impl Into<String>,
        search: impl Into<Vec<u8>>,
        replace: impl Into<Vec<u8>>,
        count: usize,
    ) -> Self {
        Self {
            description: description.into(),
            search: search.into(),
            replace: replace.into(),
            count,
        }
    }

    /// Check that the pattern can be applied in place. `index` is only used
    /// for the error.
    pub fn validate(&self, index: usize) -> Result<()> {
        let reason = if self.search.is_empty() {
            "empty search".to_string()
        } else if self.replace.len() != self.search.len() {
            format!(
                "replace length {} != search length {}",
                self.replace.len(),
                self.search.len()
            )
        } else {
            return Ok(());
        };

        Err(PatchError::InvalidPattern { index, reason })
    }
}

/// Validate a whole list, reporting the first bad pattern.
pub fn validate_all(patterns: &[Pattern]) -> Result<()> {
    patterns
        .iter()
        .enumerate()
        .try_for_each(|(i, p)| p.validate(i))
}

/// Hex strings in config files, whitespace ignored.
mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(&compact).map_err(D::Error::custom)
    }
}
