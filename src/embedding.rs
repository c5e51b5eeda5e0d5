// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

// Re-export embedding functionality from octolib
pub use octolib::embedding::{
    parse_provider_model, provider::create_embedding_provider_from_parts,
    provider::EmbeddingProvider, types::InputType,
};

use crate::config::EmbeddingConfig;

/// What the vector will be compared against. Providers that distinguish
/// the two get the matching input type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Document,
    Query,
}

impl From<EmbedMode> for InputType {
    fn from(mode: EmbedMode) -> Self {
        match mode {
            EmbedMode::Document => InputType::Document,
            EmbedMode::Query => InputType::Query,
        }
    }
}

/// A source of embedding vectors
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str, mode: EmbedMode) -> anyhow::Result<Vec<f32>>;
}

/// Backend over any octolib embedding provider
pub struct OctolibBackend {
    provider: Box<dyn EmbeddingProvider>,
}

impl OctolibBackend {
    pub async fn from_model(model: &str) -> anyhow::Result<Self> {
        let (provider, model) = parse_provider_model(model)?;
        let provider = create_embedding_provider_from_parts(&provider, &model).await?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl EmbeddingBackend for OctolibBackend {
    async fn embed(&self, text: &str, mode: EmbedMode) -> anyhow::Result<Vec<f32>> {
        let mut batch = self
            .provider
            .generate_embeddings_batch(vec![text.to_string()], mode.into())
            .await?;
        batch
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vectors"))
    }
}

/// Turns text into fixed-length vectors.
///
/// Never fails: without a provider, or when the provider errors, times out
/// or answers with the wrong dimension, the vector is derived from a hash of
/// the text instead. Such vectors are stable for identical input but carry
/// no semantic similarity.
#[derive(Clone)]
pub struct Embedder {
    backend: Option<Arc<dyn EmbeddingBackend>>,
    dimension: usize,
    max_chars: usize,
    timeout: Duration,
}

impl Embedder {
    /// Build from config. A provider that cannot be created is logged and
    /// replaced by the deterministic fallback.
    pub async fn from_config(config: &EmbeddingConfig) -> Self {
        let backend: Option<Arc<dyn EmbeddingBackend>> = if config.provider_enabled() {
            match OctolibBackend::from_model(&config.model).await {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(
                        model = %config.model,
                        error = %e,
                        "Embedding provider unavailable, using deterministic vectors"
                    );
                    None
                }
            }
        } else {
            tracing::info!("No embedding provider configured, using deterministic vectors");
            None
        };

        Self::new(backend, config)
    }

    pub fn new(backend: Option<Arc<dyn EmbeddingBackend>>, config: &EmbeddingConfig) -> Self {
        Self {
            backend,
            dimension: config.dimension.max(1),
            max_chars: config.max_chars.max(1),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// Embedder with no provider at all
    pub fn deterministic(config: &EmbeddingConfig) -> Self {
        Self::new(None, config)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn has_provider(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn embed(&self, text: &str, mode: EmbedMode) -> Vec<f32> {
        let input = truncate_chars(text, self.max_chars);
        if input.len() < text.len() {
            tracing::warn!(
                original = text.len(),
                truncated = input.len(),
                "Embedding input truncated"
            );
        }

        let Some(backend) = &self.backend else {
            return deterministic_embedding(input, self.dimension);
        };

        match tokio::time::timeout(self.timeout, backend.embed(input, mode)).await {
            Ok(Ok(vector)) if vector.len() == self.dimension => vector,
            Ok(Ok(vector)) => {
                tracing::warn!(
                    expected = self.dimension,
                    actual = vector.len(),
                    "Embedding provider returned wrong dimension, using deterministic vector"
                );
                deterministic_embedding(input, self.dimension)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Embedding provider failed, using deterministic vector");
                deterministic_embedding(input, self.dimension)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Embedding provider timed out, using deterministic vector"
                );
                deterministic_embedding(input, self.dimension)
            }
        }
    }
}

/// Hash-derived vector of `dimension` components in [-1, 1].
///
/// SHA-256 digests are chained (`seed + "*" + produced_so_far`) until enough
/// bytes exist; each pair of bytes becomes one big-endian i16 scaled by
/// `i16::MAX`.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimension);
    let mut seed = text.to_string();

    while values.len() < dimension {
        let digest = Sha256::digest(seed.as_bytes());
        for pair in digest.chunks_exact(2) {
            if values.len() == dimension {
                break;
            }
            let raw = i16::from_be_bytes([pair[0], pair[1]]);
            values.push((raw as f32 / i16::MAX as f32).clamp(-1.0, 1.0));
        }
        seed = format!("{}*{}", seed, values.len());
    }

    values
}

/// Longest prefix of at most `max_chars` bytes ending on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(Vec<f32>);

    #[async_trait]
    impl EmbeddingBackend for FixedBackend {
        async fn embed(&self, _text: &str, _mode: EmbedMode) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl EmbeddingBackend for FailingBackend {
        async fn embed(&self, _text: &str, _mode: EmbedMode) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("quota exceeded")
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl EmbeddingBackend for SlowBackend {
        async fn embed(&self, _text: &str, _mode: EmbedMode) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    fn config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "none".to_string(),
            dimension,
            max_chars: 16_000,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_deterministic_embedding_is_stable() {
        let a = deterministic_embedding("Jimma University", 1024);
        let b = deterministic_embedding("Jimma University", 1024);
        let c = deterministic_embedding("Hawassa University", 1024);

        assert_eq!(a.len(), 1024);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_deterministic_embedding_odd_dimension() {
        assert_eq!(deterministic_embedding("x", 7).len(), 7);
        assert_eq!(deterministic_embedding("", 33).len(), 33);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        // 'ሀ' is three bytes
        assert_eq!(truncate_chars("aሀ", 2), "a");
    }

    #[tokio::test]
    async fn test_provider_vector_used_when_dimension_matches() {
        let embedder = Embedder::new(Some(Arc::new(FixedBackend(vec![0.5; 4]))), &config(4));
        assert_eq!(embedder.embed("q", EmbedMode::Query).await, vec![0.5; 4]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_falls_back() {
        let embedder = Embedder::new(Some(Arc::new(FixedBackend(vec![0.5; 3]))), &config(4));
        let vector = embedder.embed("q", EmbedMode::Query).await;
        assert_eq!(vector, deterministic_embedding("q", 4));
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let embedder = Embedder::new(Some(Arc::new(FailingBackend)), &config(8));
        let vector = embedder.embed("doc", EmbedMode::Document).await;
        assert_eq!(vector, deterministic_embedding("doc", 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let embedder = Embedder::new(Some(Arc::new(SlowBackend)), &config(8));
        let vector = embedder.embed("doc", EmbedMode::Document).await;
        assert_eq!(vector.len(), 8);
    }

    #[tokio::test]
    async fn test_no_provider_uses_truncated_text() {
        let mut cfg = config(16);
        cfg.max_chars = 5;
        let embedder = Embedder::deterministic(&cfg);
        assert!(!embedder.has_provider());
        assert_eq!(
            embedder.embed("abcdefgh", EmbedMode::Query).await,
            deterministic_embedding("abcde", 16)
        );
    }
}
