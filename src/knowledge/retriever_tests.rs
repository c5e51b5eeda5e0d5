#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::super::entities::EntityKey;
    use super::super::memory_store::MemoryDocumentStore;
    use super::super::resolver::EntityResolver;
    use super::super::retriever::{Retriever, Strategy};
    use super::super::store::{DocumentStore, TextFilter, VectorQueryForm};
    use super::super::types::{KnowledgeChunk, ScoredChunk, SourceType};
    use crate::config::{EmbeddingConfig, RetrievalConfig};
    use crate::embedding::{deterministic_embedding, Embedder};
    use crate::errors::StoreError;

    const DIM: usize = 32;

    /// Memory store whose vector search can be made to fail per query form
    /// or to hide chunks
    struct ScriptedStore {
        inner: MemoryDocumentStore,
        failing_forms: Vec<VectorQueryForm>,
        dimension_mismatch: bool,
        count_fails: bool,
        vector_visible: Option<fn(&KnowledgeChunk) -> bool>,
        calls: Mutex<Vec<VectorQueryForm>>,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: MemoryDocumentStore::new(),
                failing_forms: Vec::new(),
                dimension_mismatch: false,
                count_fails: false,
                vector_visible: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<VectorQueryForm> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()> {
            self.inner.insert(chunk).await
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn count_all(&self) -> Result<usize> {
            if self.count_fails {
                anyhow::bail!("count query timed out");
            }
            self.inner.count_all().await
        }

        async fn vector_search(
            &self,
            query: &[f32],
            form: VectorQueryForm,
            num_candidates: usize,
            limit: usize,
        ) -> Result<Vec<ScoredChunk>, StoreError> {
            self.calls.lock().unwrap().push(form);
            if self.dimension_mismatch {
                return Err(StoreError::DimensionMismatch {
                    expected: 1536,
                    actual: query.len(),
                });
            }
            if self.failing_forms.contains(&form) {
                return Err(StoreError::IndexUnavailable("no index".to_string()));
            }
            let hits = self
                .inner
                .vector_search(query, form, num_candidates, usize::MAX)
                .await?;
            Ok(hits
                .into_iter()
                .filter(|hit| self.vector_visible.is_none_or(|visible| visible(&hit.chunk)))
                .take(limit)
                .collect())
        }

        async fn text_search(
            &self,
            filter: &TextFilter,
            limit: usize,
        ) -> Result<Vec<KnowledgeChunk>> {
            self.inner.text_search(filter, limit).await
        }

        async fn list(&self, limit: Option<usize>) -> Result<Vec<KnowledgeChunk>> {
            self.inner.list(limit).await
        }
    }

    fn chunk(title: &str, content: &str) -> KnowledgeChunk {
        KnowledgeChunk::new(
            title.to_string(),
            content.to_string(),
            SourceType::Text,
            deterministic_embedding(content, DIM),
        )
    }

    fn retriever(store: Arc<dyn DocumentStore>) -> Retriever {
        let embedding = EmbeddingConfig {
            model: "none".to_string(),
            dimension: DIM,
            ..EmbeddingConfig::default()
        };
        Retriever::new(
            store,
            Embedder::deterministic(&embedding),
            Arc::new(EntityResolver::new().unwrap()),
            RetrievalConfig::default(),
        )
    }

    async fn seed(store: &dyn DocumentStore, chunks: &[KnowledgeChunk]) {
        for c in chunks {
            store.insert(c).await.unwrap();
        }
    }

    fn hides_adama(c: &KnowledgeChunk) -> bool {
        !c.title.contains("Adama")
    }

    fn only_addis(c: &KnowledgeChunk) -> bool {
        c.title.contains("Addis")
    }

    fn two_universities() -> Vec<KnowledgeChunk> {
        vec![
            chunk(
                "Addis Ababa University",
                "Addis Ababa University was founded in 1950 and offers medicine and law.",
            ),
            chunk(
                "Adama Science and Technology University",
                "ASTU is located in Adama and focuses on engineering.",
            ),
        ]
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = Arc::new(ScriptedStore::new());
        let retrieval = retriever(store.clone()).retrieve("Tell me about AAU").await;

        assert!(retrieval.is_empty());
        assert_eq!(retrieval.strategy, None);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_entity_results_are_pure() {
        let store = Arc::new(ScriptedStore::new());
        let mut chunks = two_universities();
        chunks.push(chunk("Scholarships", "General scholarship information for students."));
        seed(store.as_ref(), &chunks).await;

        let resolver = EntityResolver::new().unwrap();
        let retrieval = retriever(store).retrieve("Tell me about ASTU only").await;

        assert_eq!(retrieval.strategy, Some(Strategy::SingleEntity));
        assert!(!retrieval.chunks.is_empty());
        for c in &retrieval.chunks {
            let entity = resolver.classify_document(c);
            assert!(entity.is_none() || entity == Some(EntityKey::Adama), "{}", c.title);
        }
    }

    #[tokio::test]
    async fn test_comparison_covers_both_entities() {
        let store = Arc::new(ScriptedStore::new());
        seed(store.as_ref(), &two_universities()).await;

        let resolver = EntityResolver::new().unwrap();
        let retrieval = retriever(store).retrieve("Compare AAU and ASTU").await;

        assert_eq!(retrieval.strategy, Some(Strategy::Comparison));
        assert!(retrieval.query.is_comparison);
        let entities: Vec<_> = retrieval
            .chunks
            .iter()
            .map(|c| resolver.classify_document(c))
            .collect();
        assert!(entities.contains(&Some(EntityKey::Aau)));
        assert!(entities.contains(&Some(EntityKey::Adama)));
        // Each chunk appears once even though both sub-queries return it
        assert_eq!(retrieval.chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_comparison_repairs_missing_side() {
        let mut store = ScriptedStore::new();
        // Vector search never surfaces the ASTU document
        store.vector_visible = Some(hides_adama as fn(&KnowledgeChunk) -> bool);
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let retrieval = retriever(store).retrieve("Compare AAU and ASTU").await;

        assert!(retrieval
            .chunks
            .iter()
            .any(|c| c.title == "Adama Science and Technology University"));
    }

    #[tokio::test]
    async fn test_purity_falls_back_to_text_search() {
        let mut store = ScriptedStore::new();
        store.vector_visible = Some(only_addis as fn(&KnowledgeChunk) -> bool);
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let retrieval = retriever(store).retrieve("Tell me about ASTU").await;

        assert_eq!(retrieval.chunks.len(), 1);
        assert_eq!(
            retrieval.chunks[0].title,
            "Adama Science and Technology University"
        );
    }

    #[tokio::test]
    async fn test_query_form_cascade() {
        let mut store = ScriptedStore::new();
        store.failing_forms = vec![VectorQueryForm::Indexed, VectorQueryForm::Flat];
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let retrieval = retriever(store.clone())
            .retrieve("What programs are offered?")
            .await;

        assert_eq!(retrieval.strategy, Some(Strategy::GenericVector));
        assert_eq!(retrieval.chunks.len(), 2);
        assert_eq!(
            store.calls(),
            vec![
                VectorQueryForm::Indexed,
                VectorQueryForm::Flat,
                VectorQueryForm::FlatEuclidean
            ]
        );
    }

    #[tokio::test]
    async fn test_dimension_mismatch_falls_back_to_text() {
        let mut store = ScriptedStore::new();
        store.dimension_mismatch = true;
        let store = Arc::new(store);
        seed(
            store.as_ref(),
            &[
                chunk("Hawassa University", "Hawassa University offers agriculture."),
                chunk("Jimma University", "Jimma University offers public health."),
            ],
        )
        .await;

        let retrieval = retriever(store).retrieve("Tell me about Hawassa University").await;

        assert_eq!(retrieval.strategy, Some(Strategy::TextFallback));
        assert_eq!(retrieval.chunks.len(), 1);
        assert_eq!(retrieval.chunks[0].title, "Hawassa University");
    }

    #[tokio::test]
    async fn test_text_fallback_refuses_unmentioned_institution() {
        let mut store = ScriptedStore::new();
        store.dimension_mismatch = true;
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let retrieval = retriever(store)
            .retrieve("Tell me about Mekelle University")
            .await;

        assert!(retrieval.is_empty());
        assert_eq!(retrieval.strategy, None);
    }

    #[tokio::test]
    async fn test_text_fallback_keywords() {
        let mut store = ScriptedStore::new();
        store.dimension_mismatch = true;
        let store = Arc::new(store);
        seed(
            store.as_ref(),
            &[chunk("Scholarships", "Merit scholarships cover tuition.")],
        )
        .await;

        let retrieval = retriever(store).retrieve("which scholarships exist").await;
        assert_eq!(retrieval.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_text_fallback_keeps_both_compared_entities() {
        let mut store = ScriptedStore::new();
        store.dimension_mismatch = true;
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let resolver = EntityResolver::new().unwrap();
        let retrieval = retriever(store).retrieve("Tell me about AAU and ASTU").await;

        assert_eq!(retrieval.strategy, Some(Strategy::TextFallback));
        assert!(retrieval.query.is_comparison);
        let entities: Vec<_> = retrieval
            .chunks
            .iter()
            .map(|c| resolver.classify_document(c))
            .collect();
        assert_eq!(entities.len(), 2);
        assert!(entities.contains(&Some(EntityKey::Aau)));
        assert!(entities.contains(&Some(EntityKey::Adama)));
    }

    #[tokio::test]
    async fn test_keyword_fallback_narrows_to_entity() {
        let mut store = ScriptedStore::new();
        store.dimension_mismatch = true;
        let store = Arc::new(store);
        seed(
            store.as_ref(),
            &[
                chunk(
                    "Jimma University",
                    "Jimma University tuition fees are low for public students.",
                ),
                chunk("Hawassa University", "Hawassa University tuition fees are moderate."),
            ],
        )
        .await;

        let retrieval = retriever(store).retrieve("how much are jimma fees").await;

        assert_eq!(retrieval.strategy, Some(Strategy::TextFallback));
        assert_eq!(retrieval.chunks.len(), 1);
        assert_eq!(retrieval.chunks[0].title, "Jimma University");
    }

    #[tokio::test]
    async fn test_count_failure_still_searches() {
        let mut store = ScriptedStore::new();
        store.count_fails = true;
        let store = Arc::new(store);
        seed(store.as_ref(), &two_universities()).await;

        let retrieval = retriever(store.clone())
            .retrieve("What programs are offered?")
            .await;

        assert_eq!(retrieval.strategy, Some(Strategy::GenericVector));
        assert_eq!(retrieval.chunks.len(), 2);
        assert_eq!(store.calls(), vec![VectorQueryForm::Indexed]);
    }

    #[tokio::test]
    async fn test_generic_search_keeps_store_order() {
        let store = Arc::new(ScriptedStore::new());
        let target = chunk("Library", "short");
        let other = chunk("Dormitories", &"long content about dormitories ".repeat(20));
        seed(store.as_ref(), &[other.clone(), target.clone()]).await;

        // The embedding of "short" equals the target's, so similarity ranks it first
        let retrieval = retriever(store).retrieve("short").await;
        assert_eq!(retrieval.strategy, Some(Strategy::GenericVector));
        assert_eq!(retrieval.chunks[0].id, target.id);
    }

    #[test]
    fn test_rebalance_gives_each_entity_a_share() {
        let r = retriever(Arc::new(MemoryDocumentStore::new()));
        let mut chunks: Vec<KnowledgeChunk> = (0..30)
            .map(|i| chunk(&format!("Jimma University {}", i), &"j".repeat(100 + i)))
            .collect();
        chunks.extend((0..3).map(|i| chunk(&format!("Hawassa University {}", i), "h")));
        chunks.push(chunk("General", &"g".repeat(1000)));

        let balanced = r.rebalance(&[EntityKey::Hawassa, EntityKey::Jimma], chunks);
        assert_eq!(balanced.len(), 24);
        // Hawassa first (all three), then the twelve longest Jimma chunks
        assert!(balanced[..3].iter().all(|c| c.title.starts_with("Hawassa")));
        assert_eq!(balanced[3].title, "Jimma University 29");
        assert!(balanced[3..15].iter().all(|c| c.title.starts_with("Jimma")));
        // Leftovers follow, largest first
        assert_eq!(balanced[15].title, "General");
    }
}
