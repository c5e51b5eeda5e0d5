use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an indexed document came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Text,
    Pdf,
    Website,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Text => write!(f, "text"),
            SourceType::Pdf => write!(f, "pdf"),
            SourceType::Website => write!(f, "website"),
        }
    }
}

impl From<&str> for SourceType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pdf" => SourceType::Pdf,
            "website" | "url" | "web" => SourceType::Website,
            _ => SourceType::Text,
        }
    }
}

/// One independently retrievable slice of an ingested document.
/// Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source_type: SourceType,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    pub fn new(
        title: String,
        content: String,
        source_type: SourceType,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            source_type,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Vector search hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Statistics about the knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub oldest_indexed: Option<DateTime<Utc>>,
    pub newest_indexed: Option<DateTime<Utc>>,
}

/// Result of indexing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexResult {
    pub chunk_count: usize,
    pub total_length: usize,
}
