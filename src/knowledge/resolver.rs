use anyhow::Result;
use regex::Regex;

use crate::knowledge::entities::{Entity, EntityKey, ENTITIES, KNOWN_UNINDEXED_INSTITUTIONS};
use crate::knowledge::types::KnowledgeChunk;

/// Typo rewrites applied before any matching, in order
const TYPO_RULES: &[(&str, &str)] = &[
    (r"\s+", " "),
    (
        r"\b(?:universtiy|univeristy|universty|univercity|universitiy|unversity|univesity|uinversity)\b",
        "university",
    ),
    (r"\baddis\s+abab(?:ab?)?\b", "addis ababa"),
    (r"\s*&\s*", " and "),
    (r"\bhawasa\b", "hawassa"),
    (r"\bjima\b", "jimma"),
];

/// Phrases that pin the question to one entity. `{alias}` is replaced by the
/// entity's alias alternation. Selection rules run before complement rules.
const SELECT_TEMPLATES: &[&str] = &[
    r"\b(?:only|just|solely)\s+(?:about\s+|on\s+|for\s+)?(?:the\s+)?(?:{alias})\b",
    r"\b(?:{alias})(?:\s+university)?\s+(?:only|alone)\b",
];

/// Words dropped from an extracted institution phrase
const FILLER_WORDS: &[&str] = &["only", "just", "the", "please"];

/// Leading words that cannot start an institution name
const LEADING_STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "at", "compare", "do", "does", "for", "from", "in", "is", "me",
    "of", "on", "tell", "the", "to", "vs", "what", "which", "with",
];

const COMPLEMENT_TEMPLATES: &[&str] =
    &[r"\b(?:not|except|excluding|without)\s+(?:for\s+)?(?:the\s+)?(?:{alias})\b"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExclusivityKind {
    /// The matched entity is the only one wanted
    Select,
    /// The matched entity is unwanted; the single remaining mention wins
    Complement,
}

#[derive(Debug)]
struct ExclusivityRule {
    kind: ExclusivityKind,
    entity: &'static Entity,
    pattern: Regex,
}

#[derive(Debug)]
struct EntityMatcher {
    entity: &'static Entity,
    mention: Regex,
    distinguishing: Regex,
}

/// Per-question retrieval intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalQuery {
    pub raw_text: String,
    pub resolved_entities: Vec<EntityKey>,
    pub is_comparison: bool,
}

impl RetrievalQuery {
    pub fn single_entity(&self) -> Option<EntityKey> {
        match self.resolved_entities.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Decides which universities a question or a stored chunk is about
#[derive(Debug)]
pub struct EntityResolver {
    typo_rules: Vec<(Regex, &'static str)>,
    matchers: Vec<EntityMatcher>,
    exclusivity: Vec<ExclusivityRule>,
    about_phrase: Regex,
    named_university: Regex,
    abbreviation: Regex,
}

impl EntityResolver {
    pub fn new() -> Result<Self> {
        let typo_rules = TYPO_RULES
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
            .collect::<Result<Vec<_>>>()?;

        let matchers = ENTITIES
            .iter()
            .map(|entity| {
                Ok(EntityMatcher {
                    entity,
                    mention: Regex::new(&format!(r"\b(?:{})\b", alternation(entity.aliases)))?,
                    distinguishing: Regex::new(&format!(
                        r"\b(?:{})\b",
                        alternation(entity.distinguishing_terms)
                    ))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut exclusivity = Vec::new();
        let templates = SELECT_TEMPLATES
            .iter()
            .map(|t| (ExclusivityKind::Select, *t))
            .chain(
                COMPLEMENT_TEMPLATES
                    .iter()
                    .map(|t| (ExclusivityKind::Complement, *t)),
            );
        for (kind, template) in templates {
            for entity in ENTITIES {
                let pattern = template.replace("{alias}", &alternation(entity.aliases));
                exclusivity.push(ExclusivityRule {
                    kind,
                    entity,
                    pattern: Regex::new(&pattern)?,
                });
            }
        }

        Ok(Self {
            typo_rules,
            matchers,
            exclusivity,
            about_phrase: Regex::new(r"\b(?:about|regarding)\s+([^.?!]+?)\s*(?:[.?!]|$)")?,
            named_university: Regex::new(r"\b([a-z]+(?:\s+[a-z]+)?)\s+university\b")?,
            abbreviation: Regex::new(r"\b(astu|aau|aastu)\b")?,
        })
    }

    /// Lowercase and collapse known misspellings to canonical forms
    pub fn normalize(&self, text: &str) -> String {
        let mut normalized = text.to_lowercase();
        for (pattern, replacement) in &self.typo_rules {
            normalized = pattern.replace_all(&normalized, *replacement).into_owned();
        }
        normalized.trim().to_string()
    }

    /// Entities the question concerns, in registry priority order
    pub fn resolve_entities(&self, question: &str) -> Vec<EntityKey> {
        let normalized = self.normalize(question);
        let mentioned = self.scan(&normalized);

        for rule in &self.exclusivity {
            if !rule.pattern.is_match(&normalized) {
                continue;
            }
            match rule.kind {
                ExclusivityKind::Select => {
                    tracing::debug!(entity = %rule.entity.key, "Exclusivity phrase selects entity");
                    return vec![rule.entity.key];
                }
                ExclusivityKind::Complement => {
                    let remaining: Vec<EntityKey> = mentioned
                        .iter()
                        .copied()
                        .filter(|key| *key != rule.entity.key)
                        .collect();
                    if let [only] = remaining.as_slice() {
                        tracing::debug!(
                            excluded = %rule.entity.key,
                            entity = %only,
                            "Exclusion phrase leaves a single entity"
                        );
                        return vec![*only];
                    }
                }
            }
        }

        mentioned
    }

    pub fn detect_comparison_intent(entities: &[EntityKey]) -> bool {
        entities.len() >= 2
    }

    pub fn resolve_query(&self, question: &str) -> RetrievalQuery {
        let resolved_entities = self.resolve_entities(question);
        let is_comparison = Self::detect_comparison_intent(&resolved_entities);
        RetrievalQuery {
            raw_text: question.to_string(),
            resolved_entities,
            is_comparison,
        }
    }

    /// Which entity a stored chunk is about: title first, then content,
    /// first match in priority order wins
    pub fn classify_document(&self, chunk: &KnowledgeChunk) -> Option<EntityKey> {
        self.classify(&chunk.title, &chunk.content)
    }

    pub fn classify(&self, title: &str, content: &str) -> Option<EntityKey> {
        let title = title.to_lowercase();
        if let Some(key) = self.first_distinguishing(&title) {
            return Some(key);
        }
        let content = content.to_lowercase();
        self.first_distinguishing(&content)
    }

    /// True when `name` refers to any registry entity
    pub fn is_known_entity_name(&self, name: &str) -> bool {
        let normalized = self.normalize(name);
        self.matchers.iter().any(|m| m.mention.is_match(&normalized))
    }

    /// Best-effort name of the one institution the question asks about,
    /// registry entity or not. Tried in order: institutions known to be
    /// absent from the registry, an "about X" / "regarding X" phrase, a
    /// "<words> university" phrase, a bare abbreviation.
    pub fn extract_asked_entity(&self, question: &str) -> Option<String> {
        let normalized = self.normalize(question);

        for institution in KNOWN_UNINDEXED_INSTITUTIONS {
            if normalized.contains(institution) {
                return Some(strip_university_suffix(institution));
            }
        }

        if let Some(caps) = self.about_phrase.captures(&normalized) {
            let phrase = caps[1]
                .split_whitespace()
                .filter(|w| !FILLER_WORDS.contains(w))
                .collect::<Vec<_>>()
                .join(" ");
            let names_institution = ["university", "college", "institute"]
                .iter()
                .any(|word| phrase.contains(word));
            if !phrase.is_empty() && (names_institution || self.is_known_entity_name(&phrase)) {
                return Some(strip_university_suffix(&phrase));
            }
        }

        if let Some(caps) = self.named_university.captures(&normalized) {
            let name = caps[1]
                .split_whitespace()
                .skip_while(|w| LEADING_STOP_WORDS.contains(w))
                .collect::<Vec<_>>()
                .join(" ");
            if !name.is_empty() {
                return Some(name);
            }
        }

        self.abbreviation
            .captures(&normalized)
            .map(|caps| caps[1].to_string())
    }

    /// Registry aliases that literally occur in the question
    pub fn mentioned_aliases(&self, question: &str) -> Vec<&'static str> {
        let normalized = self.normalize(question);
        ENTITIES
            .iter()
            .flat_map(|entity| entity.aliases.iter().copied())
            .filter(|alias| normalized.contains(alias))
            .collect()
    }

    /// Every entity mentioned, in priority order. A matched span is blanked
    /// out so a longer name cannot also count as the shorter name inside it.
    fn scan(&self, normalized: &str) -> Vec<EntityKey> {
        let mut working = normalized.to_string();
        let mut found = Vec::new();

        for matcher in &self.matchers {
            let spans: Vec<_> = matcher
                .mention
                .find_iter(&working)
                .map(|m| m.range())
                .collect();
            if spans.is_empty() {
                continue;
            }
            found.push(matcher.entity.key);
            for span in spans {
                let blank = " ".repeat(span.len());
                working.replace_range(span, &blank);
            }
        }

        found
    }

    fn first_distinguishing(&self, text: &str) -> Option<EntityKey> {
        self.matchers
            .iter()
            .find(|m| m.distinguishing.is_match(text))
            .map(|m| m.entity.key)
    }
}

fn strip_university_suffix(phrase: &str) -> String {
    let name = phrase.strip_suffix(" university").unwrap_or(phrase).trim();
    if name.is_empty() {
        phrase.to_string()
    } else {
        name.to_string()
    }
}

/// Regex alternation of literal terms, longest first
fn alternation(terms: &[&str]) -> String {
    let mut sorted: Vec<&str> = terms.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    sorted
        .iter()
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}
