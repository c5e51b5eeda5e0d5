use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::config::RetrievalConfig;
use crate::embedding::{EmbedMode, Embedder};
use crate::knowledge::entities::EntityKey;
use crate::knowledge::resolver::{EntityResolver, RetrievalQuery};
use crate::knowledge::store::{DocumentStore, TextFilter, VectorQueryForm};
use crate::knowledge::types::KnowledgeChunk;

/// Retrieval strategies, attempted in this order until one yields chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Per-entity vector search on each entity's expanded query
    Comparison,
    /// Vector search on the single entity's expanded query
    SingleEntity,
    /// Vector search on the raw question
    GenericVector,
    /// Substring search over titles and content
    TextFallback,
}

impl Strategy {
    pub const ORDER: [Strategy; 4] = [
        Strategy::Comparison,
        Strategy::SingleEntity,
        Strategy::GenericVector,
        Strategy::TextFallback,
    ];

    pub fn applies_to(&self, query: &RetrievalQuery) -> bool {
        match self {
            Strategy::Comparison => query.is_comparison,
            Strategy::SingleEntity => query.single_entity().is_some(),
            Strategy::GenericVector | Strategy::TextFallback => true,
        }
    }
}

/// Outcome of one `retrieve` call
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub query: RetrievalQuery,
    pub chunks: Vec<KnowledgeChunk>,
    /// Strategy that produced the chunks, `None` when nothing matched
    pub strategy: Option<Strategy>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Decides which stored chunks answer a question.
///
/// Store and provider failures never escape: a failing step counts as a step
/// that found nothing, and the next one is tried.
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedder: Embedder,
    resolver: Arc<EntityResolver>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Embedder,
        resolver: Arc<EntityResolver>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            resolver,
            config,
        }
    }

    pub async fn retrieve(&self, question: &str) -> Retrieval {
        let query = self.resolver.resolve_query(question);
        let mut retrieval = Retrieval {
            query,
            chunks: Vec::new(),
            strategy: None,
        };

        match self.store.count_all().await {
            Ok(0) => {
                tracing::info!("Knowledge base is empty");
                return retrieval;
            }
            Ok(total) => tracing::debug!(total, "Knowledge base size"),
            Err(e) => {
                tracing::warn!(error = %e, "Could not count indexed chunks, searching anyway");
            }
        }

        tracing::debug!(
            entities = ?retrieval.query.resolved_entities,
            comparison = retrieval.query.is_comparison,
            "Resolved question entities"
        );

        for strategy in Strategy::ORDER {
            if !strategy.applies_to(&retrieval.query) {
                continue;
            }
            let chunks = self.run_strategy(strategy, &retrieval.query).await;
            tracing::debug!(?strategy, found = chunks.len(), "Retrieval strategy finished");
            if !chunks.is_empty() {
                retrieval.chunks = chunks;
                retrieval.strategy = Some(strategy);
                break;
            }
        }

        if retrieval.chunks.is_empty() {
            tracing::info!("No chunk matched the question");
            return retrieval;
        }

        let query = &retrieval.query;
        let mut chunks = std::mem::take(&mut retrieval.chunks);
        if query.is_comparison {
            chunks = self.repair_comparison(&query.resolved_entities, chunks).await;
        }
        if let Some(entity) = query.single_entity() {
            chunks = self.enforce_purity(entity, chunks).await;
        }
        if query.is_comparison {
            chunks = self.rebalance(&query.resolved_entities, chunks);
        }
        retrieval.chunks = chunks;
        retrieval
    }

    pub async fn run_strategy(
        &self,
        strategy: Strategy,
        query: &RetrievalQuery,
    ) -> Vec<KnowledgeChunk> {
        match strategy {
            Strategy::Comparison => self.comparison(&query.resolved_entities).await,
            Strategy::SingleEntity => match query.single_entity() {
                Some(entity) => self.single_entity(entity).await,
                None => Vec::new(),
            },
            Strategy::GenericVector => self.generic_vector(&query.raw_text).await,
            Strategy::TextFallback => self.text_fallback(query).await,
        }
    }

    /// Each entity's expanded query is embedded and searched on its own so
    /// one entity's vocabulary cannot crowd out another's
    async fn comparison(&self, entities: &[EntityKey]) -> Vec<KnowledgeChunk> {
        let searches = entities.iter().map(|key| async move {
            let vector = self
                .embedder
                .embed(key.entity().expanded_query, EmbedMode::Query)
                .await;
            let found = self
                .vector_search_with_fallback(
                    &vector,
                    self.config.comparison_num_candidates,
                    self.config.comparison_limit_per_entity,
                )
                .await;
            tracing::debug!(entity = %key, found = found.len(), "Comparison sub-query");
            found
        });

        // join_all keeps input order, so the merge does not depend on timing
        let mut seen = HashSet::new();
        let mut merged: Vec<KnowledgeChunk> = join_all(searches)
            .await
            .into_iter()
            .flatten()
            .filter(|chunk| seen.insert(chunk.id.clone()))
            .collect();

        sort_by_length(&mut merged);
        merged.truncate(self.config.max_docs_after_merge);
        merged
    }

    async fn single_entity(&self, entity: EntityKey) -> Vec<KnowledgeChunk> {
        let vector = self
            .embedder
            .embed(entity.entity().expanded_query, EmbedMode::Query)
            .await;
        let mut found = self
            .vector_search_with_fallback(
                &vector,
                self.config.num_candidates,
                self.config.single_limit,
            )
            .await;
        sort_by_length(&mut found);
        found.truncate(self.config.single_limit);
        found
    }

    /// Keeps the store's similarity order
    async fn generic_vector(&self, question: &str) -> Vec<KnowledgeChunk> {
        let vector = self.embedder.embed(question, EmbedMode::Query).await;
        self.vector_search_with_fallback(
            &vector,
            self.config.num_candidates,
            self.config.single_limit,
        )
        .await
    }

    /// Tries every vector query form in turn; empty when all of them fail
    pub async fn vector_search_with_fallback(
        &self,
        vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Vec<KnowledgeChunk> {
        for form in VectorQueryForm::CASCADE {
            match self
                .store
                .vector_search(vector, form, num_candidates, limit)
                .await
            {
                Ok(hits) => return hits.into_iter().map(|hit| hit.chunk).collect(),
                Err(e) if e.is_dimension_mismatch() => {
                    tracing::error!(
                        ?form,
                        error = %e,
                        "Vector dimension mismatch: recreate the knowledge index with the configured embedding dimension and re-index all documents"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        ?form,
                        error = %e,
                        "Vector search failed, trying next query form"
                    );
                }
            }
        }

        tracing::warn!("All vector query forms failed");
        Vec::new()
    }

    async fn text_fallback(&self, query: &RetrievalQuery) -> Vec<KnowledgeChunk> {
        let limit = self.config.text_search_limit;

        if let Some(asked) = self.resolver.extract_asked_entity(&query.raw_text) {
            if asked.chars().count() >= 2 {
                // "aau and astu" names two entities; every side is searched
                let keys = self.resolver.resolve_entities(&asked);
                let terms: Vec<String> = if keys.is_empty() {
                    vec![asked.clone()]
                } else {
                    keys.iter()
                        .flat_map(|key| key.entity().search_terms.iter())
                        .map(|t| t.to_string())
                        .collect()
                };

                let found = self.text_search(&TextFilter::any(terms), limit).await;
                if found.is_empty() {
                    tracing::info!(asked = %asked, "No chunk mentions the asked institution");
                }
                // An asked institution with no mention is not answered from unrelated text
                return found;
            }
        }

        let words: Vec<String> = query
            .raw_text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| w.chars().count() > 1)
            .take(self.config.keyword_max_words)
            .map(str::to_string)
            .collect();

        let mut terms = vec![query.raw_text.trim().to_string()];
        terms.extend(words);
        let mut filter = TextFilter::any(terms);
        if let Some(key) = query.resolved_entities.first() {
            filter = filter.and_any(key.entity().search_terms.iter().copied());
        }

        self.text_search(&filter, limit).await
    }

    async fn text_search(&self, filter: &TextFilter, limit: usize) -> Vec<KnowledgeChunk> {
        match self.store.text_search(filter, limit).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Text search failed");
                Vec::new()
            }
        }
    }

    /// Chunks mentioning `entity` by search term, minus chunks attributed to
    /// a different entity
    async fn fetch_entity_docs(
        &self,
        entity: EntityKey,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Vec<KnowledgeChunk> {
        let filter = TextFilter::any(entity.entity().search_terms.iter().copied());
        self.text_search(&filter, limit * 2)
            .await
            .into_iter()
            .filter(|chunk| !exclude.contains(&chunk.id))
            .filter(|chunk| {
                self.resolver
                    .classify_document(chunk)
                    .is_none_or(|key| key == entity)
            })
            .take(limit)
            .collect()
    }

    /// Fetch by text for every compared entity that has no chunk yet
    async fn repair_comparison(
        &self,
        entities: &[EntityKey],
        mut chunks: Vec<KnowledgeChunk>,
    ) -> Vec<KnowledgeChunk> {
        let mut seen: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();

        for key in entities {
            let covered = chunks
                .iter()
                .any(|c| self.resolver.classify_document(c) == Some(*key));
            if covered {
                continue;
            }

            let extra = self
                .fetch_entity_docs(*key, &seen, self.config.repair_limit)
                .await;
            tracing::debug!(
                entity = %key,
                added = extra.len(),
                "Comparison side repaired by text search"
            );
            for chunk in extra {
                seen.insert(chunk.id.clone());
                chunks.push(chunk);
            }
        }

        chunks
    }

    /// Drop chunks attributed to another entity; unattributed chunks stay
    async fn enforce_purity(
        &self,
        entity: EntityKey,
        chunks: Vec<KnowledgeChunk>,
    ) -> Vec<KnowledgeChunk> {
        let before = chunks.len();
        let kept: Vec<KnowledgeChunk> = chunks
            .into_iter()
            .filter(|chunk| {
                self.resolver
                    .classify_document(chunk)
                    .is_none_or(|key| key == entity)
            })
            .collect();

        if !kept.is_empty() {
            if kept.len() < before {
                tracing::debug!(
                    entity = %entity,
                    dropped = before - kept.len(),
                    "Removed chunks about other entities"
                );
            }
            return kept;
        }

        let fallback = self
            .fetch_entity_docs(entity, &HashSet::new(), self.config.purity_fallback_limit)
            .await;
        tracing::debug!(entity = %entity, found = fallback.len(), "Purity fallback text search");
        fallback
    }

    /// Give every compared entity a fair share of the final list, largest
    /// chunks first within each share
    pub(crate) fn rebalance(
        &self,
        entities: &[EntityKey],
        chunks: Vec<KnowledgeChunk>,
    ) -> Vec<KnowledgeChunk> {
        if entities.len() < 2 {
            return chunks;
        }
        let cap = self.config.max_docs_after_merge;
        let per_entity = self.config.min_docs_per_entity.max(cap / entities.len());

        let classified: Vec<Option<EntityKey>> = chunks
            .iter()
            .map(|c| self.resolver.classify_document(c))
            .collect();

        let mut taken = vec![false; chunks.len()];
        let mut order: Vec<usize> = Vec::new();
        for key in entities {
            let mut group: Vec<usize> = (0..chunks.len())
                .filter(|&i| classified[i] == Some(*key))
                .collect();
            group.sort_by_key(|&i| std::cmp::Reverse(chunks[i].content.len()));
            for i in group.into_iter().take(per_entity) {
                taken[i] = true;
                order.push(i);
            }
        }

        if order.is_empty() {
            return chunks;
        }

        let mut rest: Vec<usize> = (0..chunks.len()).filter(|&i| !taken[i]).collect();
        rest.sort_by_key(|&i| std::cmp::Reverse(chunks[i].content.len()));
        order.extend(rest);
        order.truncate(cap);

        let mut slots: Vec<Option<KnowledgeChunk>> = chunks.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }
}

/// Longest content first; stable for equal lengths
fn sort_by_length(chunks: &mut [KnowledgeChunk]) {
    chunks.sort_by_key(|c| std::cmp::Reverse(c.content.len()));
}
