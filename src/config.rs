// Copyright 2025 Muvon Un Limited
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

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `provider:model` understood by octolib; empty or "none" disables the provider
    pub model: String,
    pub dimension: usize,
    /// Inputs longer than this are truncated before embedding
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "voyage:voyage-large-2-instruct".to_string(),
            dimension: 1024,
            max_chars: 16_000,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn provider_enabled(&self) -> bool {
        let model = self.model.trim();
        !model.is_empty() && !model.eq_ignore_ascii_case("none")
    }
}

/// Generative-text provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Never written to disk; populated from GEMINI_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_context_chars: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            temperature: 0.1,
            max_output_tokens: 2048,
            max_context_chars: 60_000,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            timeout_secs: 30,
        }
    }
}

/// Chunking configuration for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8000,
            chunk_overlap: 400,
        }
    }
}

/// Retrieval limits and context budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub num_candidates: usize,
    pub single_limit: usize,
    pub comparison_num_candidates: usize,
    pub comparison_limit_per_entity: usize,
    pub max_docs_after_merge: usize,
    pub max_context_chars: usize,
    /// Subtracted from each entity's share of the context budget
    pub comparison_margin: usize,
    pub min_docs_per_entity: usize,
    pub text_search_limit: usize,
    pub repair_limit: usize,
    pub purity_fallback_limit: usize,
    pub keyword_max_words: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_candidates: 300,
            single_limit: 20,
            comparison_num_candidates: 150,
            comparison_limit_per_entity: 12,
            max_docs_after_merge: 24,
            max_context_chars: 60_000,
            comparison_margin: 1000,
            min_docs_per_entity: 8,
            text_search_limit: 15,
            repair_limit: 8,
            purity_fallback_limit: 10,
            keyword_max_words: 8,
        }
    }
}

/// Main configuration for unibrain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load configuration from config.toml file
    /// First tries to load from system config directory, falls back to embedded template
    pub fn load() -> Result<Self> {
        let config_path = crate::storage::get_system_config_path()?;

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let template_content = include_str!("../config-templates/default.toml");
            let config = toml::from_str(template_content)?;

            if let Some(parent) = config_path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&config_path, template_content)?;

            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment wins over the file; secrets only ever come from here
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.generation.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("UNIBRAIN_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(model) = std::env::var("UNIBRAIN_GENERATION_MODEL") {
            self.generation.model = model;
        }
    }
}
