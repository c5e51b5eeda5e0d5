use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::truncate_chars;
use crate::knowledge::entities::EntityKey;
use crate::knowledge::resolver::{EntityResolver, RetrievalQuery};
use crate::knowledge::types::KnowledgeChunk;

/// First line of every comparison context
pub const COMPARISON_HEADER: &str = "Context for comparison (use BOTH sections below):";

const BLOCK_SEPARATOR: &str = "\n\n";

/// Retrieved chunks rendered for the generator, with the entity each chunk
/// was attributed to
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub entries: Vec<(KnowledgeChunk, Option<EntityKey>)>,
    pub text: String,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &KnowledgeChunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }
}

/// Builds bounded context text and checks it against the asked institution
pub struct ContextAssembler {
    resolver: Arc<EntityResolver>,
    budget: usize,
    comparison_margin: usize,
}

impl ContextAssembler {
    pub fn new(resolver: Arc<EntityResolver>, config: &RetrievalConfig) -> Self {
        Self {
            resolver,
            budget: config.max_context_chars,
            comparison_margin: config.comparison_margin,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn build_context(&self, chunks: &[KnowledgeChunk], query: &RetrievalQuery) -> ContextBlock {
        let mut context = if query.is_comparison {
            self.build_comparison(chunks, &query.resolved_entities)
        } else {
            self.build_sequential(chunks)
        };

        if context.text.len() > self.budget {
            context.text = truncate_chars(&context.text, self.budget).to_string();
        }
        context
    }

    /// `[title]\ncontent` blocks in input order until the budget is reached
    fn build_sequential(&self, chunks: &[KnowledgeChunk]) -> ContextBlock {
        let mut context = ContextBlock::default();
        let blocks = chunks.iter().map(|chunk| (chunk, render_block(chunk)));

        for (chunk, block) in blocks {
            if !push_block(&mut context.text, &block, self.budget) {
                break;
            }
            let entity = self.resolver.classify_document(chunk);
            context.entries.push((chunk.clone(), entity));
        }

        context
    }

    /// One labeled section per entity, each holding at most an even share of
    /// the budget minus the margin. Chunks not attributable to a compared
    /// entity are left out.
    fn build_comparison(&self, chunks: &[KnowledgeChunk], entities: &[EntityKey]) -> ContextBlock {
        let mut context = ContextBlock::default();
        if entities.is_empty() {
            return context;
        }
        let sub_budget = (self.budget / entities.len()).saturating_sub(self.comparison_margin);

        let classified: Vec<(&KnowledgeChunk, Option<EntityKey>)> = chunks
            .iter()
            .map(|chunk| (chunk, self.resolver.classify_document(chunk)))
            .collect();

        let mut sections = Vec::new();
        for key in entities {
            let mut group: Vec<&KnowledgeChunk> = classified
                .iter()
                .filter(|(_, entity)| *entity == Some(*key))
                .map(|(chunk, _)| *chunk)
                .collect();
            group.sort_by_key(|chunk| std::cmp::Reverse(chunk.content.len()));

            let mut body = String::new();
            for chunk in group {
                if !push_block(&mut body, &render_block(chunk), sub_budget) {
                    break;
                }
                context.entries.push((chunk.clone(), Some(*key)));
            }

            if !body.is_empty() {
                sections.push(format!("=== {} ===\n{}", key.entity().display_label, body));
            }
        }

        if sections.is_empty() {
            tracing::debug!("No chunk could be attributed to any compared entity");
            return context;
        }

        context.text = format!(
            "{}{}{}",
            COMPARISON_HEADER,
            BLOCK_SEPARATOR,
            sections.join(BLOCK_SEPARATOR)
        );
        context
    }

    /// Whether the context may be used to answer `question`.
    ///
    /// Context is trusted unless the question names an institution outside
    /// the registry; then that name has to occur in the context text or a
    /// chunk title.
    pub fn validate_context(
        &self,
        question: &str,
        context_text: &str,
        chunks: &[KnowledgeChunk],
    ) -> bool {
        let Some(asked) = self.resolver.extract_asked_entity(question) else {
            return true;
        };
        let key = asked.split_whitespace().collect::<Vec<_>>().join(" ");
        if key.chars().count() < 2 || self.resolver.is_known_entity_name(&key) {
            return true;
        }

        let patterns = [
            format!("{} university", key),
            format!("university of {}", key),
            key.clone(),
        ];

        let context_lower = context_text.to_lowercase();
        if patterns.iter().any(|p| context_lower.contains(p.as_str())) {
            return true;
        }

        let title_match = chunks.iter().any(|chunk| {
            let title = chunk.title.to_lowercase();
            title.contains(&patterns[0]) || title.contains(&patterns[1]) || title == key
        });
        if !title_match {
            tracing::warn!(
                asked = %key,
                "Retrieved context does not mention the asked institution"
            );
        }
        title_match
    }
}

fn render_block(chunk: &KnowledgeChunk) -> String {
    if chunk.title.is_empty() {
        chunk.content.clone()
    } else {
        format!("[{}]\n{}", chunk.title, chunk.content)
    }
}

/// Append `block` if it fits in `budget`. The first block of an empty
/// buffer is truncated to fit instead of being dropped.
fn push_block(buffer: &mut String, block: &str, budget: usize) -> bool {
    if budget == 0 {
        return false;
    }
    let separator = if buffer.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
    if buffer.len() + separator + block.len() <= budget {
        if separator > 0 {
            buffer.push_str(BLOCK_SEPARATOR);
        }
        buffer.push_str(block);
        return true;
    }
    if buffer.is_empty() {
        buffer.push_str(truncate_chars(block, budget));
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::SourceType;

    fn assembler(budget: usize, margin: usize) -> ContextAssembler {
        let config = RetrievalConfig {
            max_context_chars: budget,
            comparison_margin: margin,
            ..RetrievalConfig::default()
        };
        ContextAssembler::new(Arc::new(EntityResolver::new().unwrap()), &config)
    }

    fn chunk(title: &str, content: &str) -> KnowledgeChunk {
        KnowledgeChunk::new(
            title.to_string(),
            content.to_string(),
            SourceType::Text,
            vec![],
        )
    }

    fn query(entities: Vec<EntityKey>) -> RetrievalQuery {
        RetrievalQuery {
            raw_text: String::new(),
            is_comparison: entities.len() >= 2,
            resolved_entities: entities,
        }
    }

    #[test]
    fn test_sequential_blocks_in_order() {
        let a = assembler(60_000, 1000);
        let chunks = vec![chunk("One", "first"), chunk("Two", "second")];
        let context = a.build_context(&chunks, &query(vec![]));
        assert_eq!(context.text, "[One]\nfirst\n\n[Two]\nsecond");
        assert_eq!(context.entries.len(), 2);
    }

    #[test]
    fn test_sequential_stops_at_budget() {
        let a = assembler(29, 0);
        let chunks = vec![
            chunk("A", "x".repeat(10).as_str()),
            chunk("B", "y".repeat(10).as_str()),
            chunk("C", "z"),
        ];
        let context = a.build_context(&chunks, &query(vec![]));
        // Second block would overflow; no partial block, and nothing after it
        assert_eq!(context.text, format!("[A]\n{}", "x".repeat(10)));
        assert_eq!(context.entries.len(), 1);
    }

    #[test]
    fn test_oversized_first_block_is_truncated() {
        let a = assembler(50, 0);
        let chunks = vec![chunk("Big", &"w".repeat(500))];
        let context = a.build_context(&chunks, &query(vec![]));
        assert_eq!(context.text.len(), 50);
        assert_eq!(context.entries.len(), 1);
    }

    #[test]
    fn test_budget_never_exceeded() {
        for budget in [0, 1, 10, 200, 5_000] {
            let a = assembler(budget, 100);
            let chunks: Vec<_> = (0..20)
                .map(|i| chunk(&format!("Jimma {}", i), &"j".repeat(i * 37)))
                .chain((0..20).map(|i| chunk(&format!("Hawassa {}", i), &"h".repeat(i * 53))))
                .collect();
            for q in [
                query(vec![]),
                query(vec![EntityKey::Jimma]),
                query(vec![EntityKey::Hawassa, EntityKey::Jimma]),
            ] {
                assert!(a.build_context(&chunks, &q).text.len() <= budget);
            }
        }
    }

    #[test]
    fn test_comparison_sections() {
        let a = assembler(60_000, 1000);
        let chunks = vec![
            chunk("Addis Ababa University", "AAU was founded in 1950."),
            chunk("Adama Science and Technology University", "ASTU is in Adama."),
            chunk("Scholarships", "General scholarship information."),
        ];
        let context = a.build_context(&chunks, &query(vec![EntityKey::Aau, EntityKey::Adama]));

        assert!(context.text.starts_with(COMPARISON_HEADER));
        assert!(context
            .text
            .contains("=== Addis Ababa University (AAU) ===\n[Addis Ababa University]"));
        assert!(context.text.contains("=== Adama Science and Technology University (ASTU) ==="));
        assert!(!context.text.contains("Scholarships"));
        let aau = context.text.find("(AAU) ===").unwrap();
        let astu = context.text.find("(ASTU) ===").unwrap();
        assert!(aau < astu);
    }

    #[test]
    fn test_comparison_section_respects_sub_budget() {
        let a = assembler(4000, 1000);
        // sub-budget = 4000 / 2 - 1000 = 1000
        let chunks: Vec<_> = (0..10)
            .map(|i| chunk(&format!("Jimma part {}", i), &"j".repeat(300)))
            .chain((0..10).map(|i| chunk(&format!("Hawassa part {}", i), &"h".repeat(300))))
            .collect();
        let context = a.build_context(&chunks, &query(vec![EntityKey::Hawassa, EntityKey::Jimma]));

        for section in context.text.split("=== ").skip(1) {
            let body_start = section.find("===\n").unwrap() + 4;
            let body = section[body_start..].trim_end();
            assert!(body.len() <= 1000, "section body {} bytes", body.len());
            assert!(!body.is_empty());
        }
    }

    #[test]
    fn test_comparison_without_attributable_chunks_is_empty() {
        let a = assembler(60_000, 1000);
        let chunks = vec![chunk("Scholarships", "Nothing specific.")];
        let context = a.build_context(&chunks, &query(vec![EntityKey::Aau, EntityKey::Jimma]));
        assert!(context.is_empty());
    }

    #[test]
    fn test_validate_unknown_institution() {
        let a = assembler(60_000, 1000);
        let chunks = vec![chunk("Addis Ababa University", "AAU offers medicine.")];
        let text = "[Addis Ababa University]\nAAU offers medicine.";

        assert!(!a.validate_context("Tell me about Unity University", text, &chunks));
        assert!(!a.validate_context("What does Mekelle University offer?", text, &chunks));
    }

    #[test]
    fn test_validate_trusts_known_and_general() {
        let a = assembler(60_000, 1000);
        let chunks = vec![chunk("Hawassa University", "Hawassa offers agriculture.")];
        let text = "[Hawassa University]\nHawassa offers agriculture.";

        assert!(a.validate_context("Tell me about Hawassa University", text, &chunks));
        assert!(a.validate_context("Tell me about AAU", text, &chunks));
        assert!(a.validate_context("What is the capital of Ethiopia?", text, &chunks));
    }

    #[test]
    fn test_validate_unknown_institution_present() {
        let a = assembler(60_000, 1000);
        let chunks = vec![chunk("Mekelle University", "Located in Tigray.")];
        let text = "[Mekelle University]\nLocated in Tigray.";
        assert!(a.validate_context("Tell me about Mekelle University", text, &chunks));
    }
}
