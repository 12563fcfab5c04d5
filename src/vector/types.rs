//! Passage type and wire shapes for the Pinecone query API.

use serde::{Deserialize, Deserializer};

/// Passage returned by the vector index for one query.
///
/// Lives only for the duration of a single pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    /// Identifier of the vector in the index.
    pub id: String,
    /// Similarity score reported by the index.
    pub relevance_score: f32,
    /// Title of the source document.
    pub title: String,
    /// Passage text.
    pub text: String,
    /// Identifier of the source document.
    pub source_id: i64,
    /// Position of the chunk within its source document.
    pub chunk_index: i64,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
pub(crate) struct QueryMatch {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) metadata: Option<MatchMetadata>,
}

#[derive(Deserialize, Default)]
pub(crate) struct MatchMetadata {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default, deserialize_with = "integral_number")]
    pub(crate) source_id: i64,
    #[serde(default, deserialize_with = "integral_number")]
    pub(crate) chunk_index: i64,
}

impl From<QueryMatch> for RetrievedPassage {
    fn from(found: QueryMatch) -> Self {
        let QueryMatch {
            id,
            score,
            metadata,
        } = found;
        let metadata = metadata.unwrap_or_default();
        Self {
            id,
            relevance_score: score,
            title: metadata.title.trim().to_string(),
            text: metadata.text,
            source_id: metadata.source_id,
            chunk_index: metadata.chunk_index,
        }
    }
}

// Pinecone stores metadata numbers as floats, so `3` comes back as `3.0`.
fn integral_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "expected an integral number, got {value}"
        )));
    }
    Ok(value as i64)
}
