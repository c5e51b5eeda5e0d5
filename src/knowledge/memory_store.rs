use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::knowledge::store::{DocumentStore, TextFilter, VectorQueryForm};
use crate::knowledge::types::{KnowledgeChunk, ScoredChunk};

/// In-process document store with exact similarity scoring.
///
/// Used for tests and for runs that should not touch disk. The indexed
/// form behaves like the flat cosine form since there is no index to use.
#[derive(Default)]
pub struct MemoryDocumentStore {
    chunks: RwLock<Vec<KnowledgeChunk>>,
    vector_dim: Option<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject queries whose length differs from `vector_dim`
    pub fn with_dimension(vector_dim: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            vector_dim: Some(vector_dim),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()> {
        self.chunks.write().await.push(chunk.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| c.id != id);
        Ok(chunks.len() != before)
    }

    async fn count_all(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        form: VectorQueryForm,
        _num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if let Some(expected) = self.vector_dim {
            if query.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| c.embedding.len() == query.len())
            .map(|c| {
                let score = match form {
                    VectorQueryForm::Indexed | VectorQueryForm::Flat => {
                        cosine_similarity(query, &c.embedding)
                    }
                    VectorQueryForm::FlatEuclidean => {
                        1.0 / (1.0 + euclidean_distance(query, &c.embedding))
                    }
                };
                ScoredChunk {
                    chunk: c.clone(),
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn text_search(&self, filter: &TextFilter, limit: usize) -> Result<Vec<KnowledgeChunk>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|c| filter.matches(&c.title, &c.content))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<KnowledgeChunk>> {
        let mut chunks = self.chunks.read().await.clone();
        chunks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::SourceType;

    fn chunk(title: &str, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk::new(
            title.to_string(),
            format!("{} content", title),
            SourceType::Text,
            embedding,
        )
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity() {
        let store = MemoryDocumentStore::new();
        store.insert(&chunk("near", vec![1.0, 0.0])).await.unwrap();
        store.insert(&chunk("far", vec![0.0, 1.0])).await.unwrap();
        store.insert(&chunk("mid", vec![1.0, 1.0])).await.unwrap();

        for form in VectorQueryForm::CASCADE {
            let hits = store.vector_search(&[1.0, 0.0], form, 10, 2).await.unwrap();
            let titles: Vec<_> = hits.iter().map(|h| h.chunk.title.as_str()).collect();
            assert_eq!(titles, vec!["near", "mid"]);
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = MemoryDocumentStore::with_dimension(3);
        let err = store
            .vector_search(&[1.0, 0.0], VectorQueryForm::Indexed, 10, 5)
            .await
            .unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let store = MemoryDocumentStore::new();
        let c = chunk("a", vec![1.0]);
        store.insert(&c).await.unwrap();
        assert_eq!(store.count_all().await.unwrap(), 1);
        assert!(store.delete(&c.id).await.unwrap());
        assert!(!store.delete(&c.id).await.unwrap());
        assert_eq!(store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_text_search_limit() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store
                .insert(&chunk(&format!("Jimma {}", i), vec![0.0]))
                .await
                .unwrap();
        }
        let hits = store
            .text_search(&TextFilter::any(["jimma"]), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }
}
