use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical identifier of a known university
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKey {
    Aastu,
    Aau,
    Adama,
    Hawassa,
    Jimma,
}

impl EntityKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKey::Aastu => "aastu",
            EntityKey::Aau => "aau",
            EntityKey::Adama => "adama",
            EntityKey::Hawassa => "hawassa",
            EntityKey::Jimma => "jimma",
        }
    }

    pub fn entity(&self) -> &'static Entity {
        // Registry is indexed by declaration order
        &ENTITIES[*self as usize]
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ENTITIES
            .iter()
            .find(|e| e.key.as_str() == s.trim().to_lowercase())
            .map(|e| e.key)
            .ok_or_else(|| anyhow::anyhow!("Unknown university key: {}", s))
    }
}

/// Static reference record for one university.
///
/// All term lists are lowercase and already typo-normalized except where a
/// misspelling is listed on purpose, so stored text that was never
/// normalized still matches.
#[derive(Debug)]
pub struct Entity {
    pub key: EntityKey,
    /// Section header used in comparison context
    pub display_label: &'static str,
    /// Names, abbreviations and misspellings recognised in questions
    pub aliases: &'static [&'static str],
    /// Case-insensitive substrings for store text search
    pub search_terms: &'static [&'static str],
    /// Whole-word terms that attribute a stored chunk to this entity
    pub distinguishing_terms: &'static [&'static str],
    /// Phrase embedded instead of the user's wording for entity-targeted retrieval
    pub expanded_query: &'static str,
}

/// Registry in fixed priority order. More specific names come before names
/// they contain ("addis ababa science" before "addis ababa", "aastu" before
/// "astu"), and the order doubles as the tie-break everywhere.
pub static ENTITIES: &[Entity] = &[
    Entity {
        key: EntityKey::Aastu,
        display_label: "Addis Ababa Science and Technology University (AASTU)",
        aliases: &[
            "addis ababa science and technology university",
            "addis ababa science and technology",
            "addis ababa science",
            "aastu",
        ],
        search_terms: &["aastu", "addis ababa science and technology"],
        distinguishing_terms: &["aastu", "addis ababa science"],
        expanded_query: "Addis Ababa Science and Technology University AASTU Ethiopia programs",
    },
    Entity {
        key: EntityKey::Aau,
        display_label: "Addis Ababa University (AAU)",
        aliases: &["addis ababa university", "addis ababa", "aau"],
        search_terms: &["addis ababa university", "aau"],
        distinguishing_terms: &["aau", "addis ababa university", "university of addis ababa"],
        expanded_query: "Addis Ababa University AAU Ethiopia programs admission history capital",
    },
    Entity {
        key: EntityKey::Adama,
        display_label: "Adama Science and Technology University (ASTU)",
        aliases: &[
            "adama science and technology university",
            "adama science and technology",
            "adama science",
            "adama university",
            "adama",
            "astu",
        ],
        search_terms: &["adama science", "adama university", "astu"],
        distinguishing_terms: &["adama", "astu"],
        expanded_query:
            "Adama Science and Technology University ASTU Ethiopia programs admission Nazret",
    },
    Entity {
        key: EntityKey::Hawassa,
        display_label: "Hawassa University",
        aliases: &["hawassa university", "hawassa", "hawasa"],
        search_terms: &["hawassa university", "hawasa university", "hawassa", "hawasa"],
        distinguishing_terms: &["hawassa", "hawasa"],
        expanded_query: "Hawassa University Ethiopia programs admission Sidama",
    },
    Entity {
        key: EntityKey::Jimma,
        display_label: "Jimma University",
        aliases: &["jimma university", "jimma", "jima"],
        search_terms: &["jimma university", "jima university", "jimma"],
        distinguishing_terms: &["jimma", "jima"],
        expanded_query: "Jimma University Ethiopia programs admission Oromia",
    },
];

/// Institutions users ask about that have no registry entry; recognising
/// them lets answers about them be validated strictly.
pub const KNOWN_UNINDEXED_INSTITUTIONS: &[&str] =
    &["unity university", "bahir dar university", "hope university"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_indexed_by_key() {
        for entity in ENTITIES {
            assert_eq!(entity.key.entity().key, entity.key);
        }
    }

    #[test]
    fn test_key_round_trip_through_str() {
        assert_eq!("adama".parse::<EntityKey>().unwrap(), EntityKey::Adama);
        assert_eq!(" AAU ".parse::<EntityKey>().unwrap(), EntityKey::Aau);
        assert!("bahir dar".parse::<EntityKey>().is_err());
        assert_eq!(EntityKey::Hawassa.to_string(), "hawassa");
    }

    #[test]
    fn test_terms_are_lowercase() {
        for entity in ENTITIES {
            let lists = [entity.aliases, entity.search_terms, entity.distinguishing_terms];
            for term in lists.iter().flat_map(|l| l.iter()) {
                assert_eq!(*term, term.to_lowercase());
            }
        }
    }
}
