use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use regex::Regex;

use crate::config::GenerationConfig;
use crate::constants::{
    APOLOGY_MESSAGE, CONTEXT_DELIMITER, EXTRACTIVE_PREFIX, NOT_ENOUGH_INFORMATION_MESSAGE,
    NO_INFORMATION_MESSAGE, RAG_SYSTEM_PROMPT, TRUNCATION_MARKER,
};
use crate::embedding::truncate_chars;
use crate::generation::GenerativeProvider;
use crate::knowledge::context::COMPARISON_HEADER;
use crate::knowledge::resolver::EntityResolver;

const MIN_BLOCK_CHARS: usize = 30;
const MIN_SENTENCE_CHARS: usize = 25;
const MAX_TOPIC_WORDS: usize = 5;
const MAX_RELEVANT_SENTENCES: usize = 6;
const MAX_FALLBACK_SENTENCES: usize = 8;
const MAX_EXTRACTIVE_CHARS: usize = 600;

/// Turns context and question into the final answer text. Never fails.
pub struct AnswerGenerator {
    provider: Option<Arc<dyn GenerativeProvider>>,
    resolver: Arc<EntityResolver>,
    config: GenerationConfig,
    title_line: Regex,
    title_marker: Regex,
    section_label: Regex,
    sentence_end: Regex,
    whitespace: Regex,
}

impl AnswerGenerator {
    pub fn new(
        provider: Option<Arc<dyn GenerativeProvider>>,
        resolver: Arc<EntityResolver>,
        config: GenerationConfig,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            resolver,
            config,
            title_line: Regex::new(r"^\[[^\]]+\]\s*$")?,
            title_marker: Regex::new(r"\n*\[[^\]]+\]\n*")?,
            section_label: Regex::new(r"===[^=\n]*===")?,
            sentence_end: Regex::new(r"[.!?]+")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn generate(&self, context: &str, question: &str) -> String {
        match AssertUnwindSafe(self.answer(context, question))
            .catch_unwind()
            .await
        {
            Ok(answer) => answer,
            Err(_) => {
                tracing::error!("Answer generation panicked");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    async fn answer(&self, context: &str, question: &str) -> String {
        if context.trim().is_empty() {
            return NO_INFORMATION_MESSAGE.to_string();
        }

        if let Some(provider) = &self.provider {
            if let Some(answer) = self
                .generate_with_provider(provider.as_ref(), context, question)
                .await
            {
                return answer;
            }
            tracing::info!("Falling back to extractive answer");
        }

        self.extractive_answer(context, question)
    }

    /// `None` when the provider could not produce an answer. Only rate
    /// limits are retried, with a delay growing linearly per attempt.
    async fn generate_with_provider(
        &self,
        provider: &dyn GenerativeProvider,
        context: &str,
        question: &str,
    ) -> Option<String> {
        let context = if context.len() > self.config.max_context_chars {
            format!(
                "{}{}",
                truncate_chars(context, self.config.max_context_chars),
                TRUNCATION_MARKER
            )
        } else {
            context.to_string()
        };
        let system = format!("{}{}{}", RAG_SYSTEM_PROMPT, CONTEXT_DELIMITER, context);
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            match tokio::time::timeout(timeout, provider.generate(&system, question)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => return Some(text.trim().to_string()),
                Ok(Ok(_)) => {
                    tracing::warn!("Generative provider returned an empty answer");
                    return None;
                }
                Ok(Err(e)) if e.is_rate_limited() && attempt < max_attempts => {
                    let delay =
                        Duration::from_millis(self.config.retry_base_delay_ms * attempt as u64);
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Generative provider rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "Generative provider failed");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = timeout.as_secs(),
                        "Generative provider timed out"
                    );
                    return None;
                }
            }
        }

        None
    }

    /// Answer stitched from context sentences that share words with the question
    pub fn extractive_answer(&self, context: &str, question: &str) -> String {
        let topic_terms = self.topic_terms(question);

        let mut blocks: Vec<String> = self
            .split_blocks(context)
            .into_iter()
            .filter(|block| block.chars().count() >= MIN_BLOCK_CHARS)
            .collect();
        if blocks.is_empty() {
            blocks.push(context.to_string());
        }

        if !topic_terms.is_empty() {
            let on_topic: Vec<String> = blocks
                .iter()
                .filter(|block| {
                    let lower = block.to_lowercase();
                    topic_terms.iter().any(|t| lower.contains(t.as_str()))
                })
                .cloned()
                .collect();
            if !on_topic.is_empty() {
                blocks = on_topic;
            }
        }

        let combined = blocks.join("\n\n").replace(COMPARISON_HEADER, " ");
        let combined = self.section_label.replace_all(&combined, " ");
        let combined = self.title_marker.replace_all(&combined, " ");
        let clean = self.whitespace.replace_all(&combined, " ");

        let sentences: Vec<&str> = self
            .sentence_end
            .split(clean.trim())
            .map(str::trim)
            .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
            .collect();

        let question_words: Vec<String> = question
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(str::to_string)
            .collect();

        let relevant: Vec<&str> = sentences
            .iter()
            .copied()
            .filter(|s| {
                let lower = s.to_lowercase();
                question_words.iter().any(|w| lower.contains(w.as_str()))
            })
            .collect();

        let (pool, take) = if relevant.is_empty() {
            (&sentences, MAX_FALLBACK_SENTENCES)
        } else {
            (&relevant, MAX_RELEVANT_SENTENCES)
        };
        let shown: Vec<&str> = pool.iter().copied().take(take).collect();

        let mut raw = shown.join(". ");
        if shown.len() < pool.len() {
            raw.push('.');
        }

        let answer = if raw.len() > MAX_EXTRACTIVE_CHARS {
            format!("{}...", truncate_chars(&raw, MAX_EXTRACTIVE_CHARS))
        } else {
            raw
        };

        if answer.trim().is_empty() {
            return NOT_ENOUGH_INFORMATION_MESSAGE.to_string();
        }
        format!("{}{}", EXTRACTIVE_PREFIX, answer)
    }

    /// Registry names mentioned in the question, then its longer words
    fn topic_terms(&self, question: &str) -> Vec<String> {
        let mut terms: Vec<String> = self
            .resolver
            .mentioned_aliases(question)
            .into_iter()
            .map(str::to_string)
            .collect();

        let lower = question.to_lowercase();
        let words = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| w.chars().count() > 3)
            .take(MAX_TOPIC_WORDS);
        for word in words {
            if !terms.iter().any(|t| t == word) {
                terms.push(word.to_string());
            }
        }
        terms
    }

    /// Split at each `[title]` line
    fn split_blocks(&self, context: &str) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current = String::new();

        for line in context.lines() {
            if self.title_line.is_match(line) && !current.trim().is_empty() {
                blocks.push(current.trim().to_string());
                current.clear();
            }
            current.push_str(line);
            current.push('\n');
        }
        if !current.trim().is_empty() {
            blocks.push(current.trim().to_string());
        }

        blocks
    }
}
