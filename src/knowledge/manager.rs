use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::constants::{MIN_WEBSITE_TEXT_CHARS, NO_INFORMATION_MESSAGE};
use crate::embedding::{EmbedMode, Embedder};
use crate::generation::{GeminiProvider, GenerativeProvider};
use crate::knowledge::answer::AnswerGenerator;
use crate::knowledge::chunker::TextChunker;
use crate::knowledge::context::{ContextAssembler, ContextBlock};
use crate::knowledge::resolver::EntityResolver;
use crate::knowledge::retriever::{Retrieval, Retriever};
use crate::knowledge::store::{DocumentStore, LanceKnowledgeStore};
use crate::knowledge::types::{IndexResult, KnowledgeChunk, KnowledgeStats, SourceType};

/// What retrieval left for the generator
#[derive(Debug)]
pub enum ContextOutcome {
    Found(ContextBlock),
    /// No chunk satisfied any strategy, or none survived assembly
    NoMatch,
    /// The context does not concern the institution the question names
    EntityMismatch,
}

/// Entry point for answering questions and maintaining the knowledge base
pub struct KnowledgeManager {
    store: Arc<dyn DocumentStore>,
    embedder: Embedder,
    chunker: TextChunker,
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
}

impl KnowledgeManager {
    /// Open the persistent store and providers described by `config`
    pub async fn new(config: &Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config.embedding).await;
        let store = LanceKnowledgeStore::new(embedder.dimension()).await?;
        let provider = match GeminiProvider::from_config(&config.generation) {
            Ok(p) => Some(Arc::new(p) as Arc<dyn GenerativeProvider>),
            Err(e) => {
                tracing::info!(reason = %e, "Answers will be extractive");
                None
            }
        };

        Self::with_components(Arc::new(store), embedder, provider, config)
    }

    pub fn with_components(
        store: Arc<dyn DocumentStore>,
        embedder: Embedder,
        provider: Option<Arc<dyn GenerativeProvider>>,
        config: &Config,
    ) -> Result<Self> {
        let resolver = Arc::new(EntityResolver::new()?);

        Ok(Self {
            retriever: Retriever::new(
                store.clone(),
                embedder.clone(),
                resolver.clone(),
                config.retrieval.clone(),
            ),
            assembler: ContextAssembler::new(resolver.clone(), &config.retrieval),
            generator: AnswerGenerator::new(provider, resolver, config.generation.clone())?,
            chunker: TextChunker::new(&config.chunking),
            store,
            embedder,
        })
    }

    /// Answer a question from the indexed documents. Never fails.
    pub async fn answer_question(&self, question: &str) -> String {
        match self.prepare_context(question).await {
            ContextOutcome::Found(block) => self.generator.generate(&block.text, question).await,
            ContextOutcome::NoMatch | ContextOutcome::EntityMismatch => {
                NO_INFORMATION_MESSAGE.to_string()
            }
        }
    }

    /// Retrieve, assemble and validate the context for `question`
    pub async fn prepare_context(&self, question: &str) -> ContextOutcome {
        let Retrieval {
            query,
            chunks,
            strategy,
        } = self.retriever.retrieve(question).await;

        if chunks.is_empty() {
            tracing::info!("No documents matched the question");
            return ContextOutcome::NoMatch;
        }

        let block = self.assembler.build_context(&chunks, &query);
        if block.is_empty() {
            tracing::info!(found = chunks.len(), "Retrieved documents produced no context");
            return ContextOutcome::NoMatch;
        }

        if !self
            .assembler
            .validate_context(question, &block.text, &chunks)
        {
            return ContextOutcome::EntityMismatch;
        }

        tracing::debug!(
            strategy = ?strategy,
            chunks = block.entries.len(),
            context_len = block.text.len(),
            "Context assembled"
        );
        ContextOutcome::Found(block)
    }

    /// Split `text` into chunks, embed and store each one.
    ///
    /// Chunks are inserted one at a time; a failure part-way leaves the
    /// earlier chunks stored.
    pub async fn index_content(
        &self,
        title: &str,
        text: &str,
        source_type: SourceType,
    ) -> Result<IndexResult> {
        let title = title.trim();
        let text = text.trim();
        if title.is_empty() {
            anyhow::bail!("Title cannot be empty");
        }
        if text.is_empty() {
            anyhow::bail!("Content cannot be empty");
        }

        let pieces: Vec<_> = self.chunker.chunk(text).collect();
        let total = pieces.len();

        for (i, piece) in pieces.iter().enumerate() {
            let chunk_title = if total > 1 {
                format!("{} (part {}/{})", title, i + 1, total)
            } else {
                title.to_string()
            };
            let embedding = self.embedder.embed(piece.text, EmbedMode::Document).await;
            let chunk =
                KnowledgeChunk::new(chunk_title, piece.text.to_string(), source_type, embedding);
            self.store.insert(&chunk).await.with_context(|| {
                format!("Failed to store chunk {}/{} of '{}'", i + 1, total, title)
            })?;
        }

        if let Err(e) = self.store.optimize().await {
            tracing::warn!(error = %e, "Index maintenance failed");
        }

        tracing::info!(
            title = %title,
            source_type = %source_type,
            chunks = total,
            length = text.len(),
            "Content indexed"
        );
        Ok(IndexResult {
            chunk_count: total,
            total_length: text.len(),
        })
    }

    pub async fn index_pdf(&self, path: &Path, title: Option<&str>) -> Result<IndexResult> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await?
            .map_err(|e| anyhow::anyhow!("Failed to extract PDF text: {}", e))?;

        let title = match title {
            Some(t) => t.to_string(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "PDF document".to_string()),
        };
        self.index_content(&title, &text, SourceType::Pdf).await
    }

    pub async fn index_url(&self, url: &str, title: Option<&str>) -> Result<IndexResult> {
        let html = fetch_url(url).await?;
        let text = html2text::config::plain()
            .string_from_read(html.as_bytes(), 120)
            .map_err(|e| anyhow::anyhow!("Failed to convert page to text: {}", e))?;
        if text.trim().len() < MIN_WEBSITE_TEXT_CHARS {
            anyhow::bail!("Page at {} has too little text to index", url);
        }

        let title = title.unwrap_or(url.trim());
        self.index_content(title, &text, SourceType::Website).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(id).await
    }

    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<KnowledgeChunk>> {
        self.store.list(limit).await
    }

    pub async fn stats(&self) -> Result<KnowledgeStats> {
        let chunks = self.store.list(None).await?;
        let sources: HashSet<&str> = chunks.iter().map(|c| source_title(&c.title)).collect();

        Ok(KnowledgeStats {
            total_chunks: chunks.len(),
            total_sources: sources.len(),
            oldest_indexed: chunks.iter().map(|c| c.created_at).min(),
            newest_indexed: chunks.iter().map(|c| c.created_at).max(),
        })
    }
}

/// Title without the `(part i/n)` suffix added on ingestion
pub fn source_title(title: &str) -> &str {
    match title.rfind(" (part ") {
        Some(pos) if title.ends_with(')') => &title[..pos],
        _ => title,
    }
}

async fn fetch_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        anyhow::bail!("URL cannot be empty");
    }

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        anyhow::bail!(
            "Invalid URL: must start with http:// or https://, got: {}",
            trimmed
        );
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("Unibrain/0.3")
        .build()?;

    let response = client
        .get(trimmed)
        .send()
        .await
        .context("Failed to fetch URL")?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error: {}", response.status());
    }

    response
        .text()
        .await
        .context("Failed to read response body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::knowledge::memory_store::MemoryDocumentStore;

    fn manager(chunk_size: usize) -> KnowledgeManager {
        let mut config = Config::default();
        config.embedding = EmbeddingConfig {
            dimension: 16,
            ..EmbeddingConfig::default()
        };
        config.chunking.chunk_size = chunk_size;
        config.chunking.chunk_overlap = 10;
        KnowledgeManager::with_components(
            Arc::new(MemoryDocumentStore::new()),
            Embedder::deterministic(&config.embedding),
            None,
            &config,
        )
        .unwrap()
    }

    #[test]
    fn test_source_title() {
        assert_eq!(source_title("Handbook (part 2/3)"), "Handbook");
        assert_eq!(source_title("Handbook"), "Handbook");
        assert_eq!(source_title("Notes (part one"), "Notes (part one");
    }

    #[tokio::test]
    async fn test_index_content_titles_parts() {
        let m = manager(100);
        let text = "Jimma University admissions. ".repeat(10);
        let result = m.index_content("Jimma Guide", &text, SourceType::Text).await.unwrap();

        assert!(result.chunk_count > 1);
        assert_eq!(result.total_length, text.trim().len());

        let chunks = m.list(None).await.unwrap();
        assert_eq!(chunks.len(), result.chunk_count);
        let expected = format!("Jimma Guide (part 1/{})", result.chunk_count);
        assert!(chunks.iter().any(|c| c.title == expected));
    }

    #[tokio::test]
    async fn test_short_content_single_chunk() {
        let m = manager(8000);
        let result = m
            .index_content(
                "  AAU Overview ",
                "  Addis Ababa University was founded in 1950. ",
                SourceType::Pdf,
            )
            .await
            .unwrap();

        assert_eq!(result.chunk_count, 1);
        let chunks = m.list(None).await.unwrap();
        assert_eq!(chunks[0].title, "AAU Overview");
        assert_eq!(chunks[0].source_type, SourceType::Pdf);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let m = manager(8000);
        assert!(m.index_content("Title", "   ", SourceType::Text).await.is_err());
        assert!(m.index_content("", "text", SourceType::Text).await.is_err());
    }

    #[tokio::test]
    async fn test_stats_group_parts_by_source() {
        let m = manager(100);
        m.index_content("Guide", &"Hawassa University campus life. ".repeat(10), SourceType::Text)
            .await
            .unwrap();
        m.index_content("Fees", "Tuition is waived for public students.", SourceType::Text)
            .await
            .unwrap();

        let stats = m.stats().await.unwrap();
        assert_eq!(stats.total_sources, 2);
        assert!(stats.total_chunks > 2);
        assert!(stats.oldest_indexed <= stats.newest_indexed);
    }

    #[tokio::test]
    async fn test_delete_chunk() {
        let m = manager(8000);
        m.index_content("Fees", "Tuition is waived for public students.", SourceType::Text)
            .await
            .unwrap();
        let id = m.list(None).await.unwrap()[0].id.clone();

        assert!(m.delete(&id).await.unwrap());
        assert!(!m.delete(&id).await.unwrap());
        assert!(m.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let m = manager(8000);
        assert!(m.index_url("ftp://example.org", None).await.is_err());
        assert!(m.index_url("  ", None).await.is_err());
    }
}
