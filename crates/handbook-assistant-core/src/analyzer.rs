//! Query analysis: cleaning, keyword and entity extraction, intent
//! classification, and advisory query expansion.
//!
//! [`QueryAnalyzer::analyze`] never fails. Internal errors produce a
//! degraded analysis that treats the whole query as a single keyword of
//! type [`QueryType::Factual`] so retrieval always has something to use.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::domain::{DomainVocabulary, SynonymGroup};
use crate::error::{AnalyzerError, ConfigError};
use crate::models::{QueryAnalysis, QueryType};
use crate::rules::RuleTable;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word regex is valid"));

const MAX_EXPANSIONS: usize = 3;
const MIN_KEYWORDS: usize = 3;
const MIN_WORDS: usize = 4;

#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    domain_name: String,
    stop_words: HashSet<String>,
    entities: Vec<String>,
    synonyms: Vec<SynonymGroup>,
    query_types: RuleTable<QueryType>,
}

impl QueryAnalyzer {
    pub fn from_vocabulary(vocab: &DomainVocabulary) -> Result<Self, ConfigError> {
        Ok(Self {
            domain_name: vocab.name.clone(),
            stop_words: vocab.stop_words.iter().map(|w| w.to_lowercase()).collect(),
            entities: vocab.entities.iter().map(|e| e.to_lowercase()).collect(),
            synonyms: vocab.synonyms.clone(),
            query_types: vocab.query_type_table()?,
        })
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        match self.try_analyze(query) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "query analysis degraded");
                degraded(query)
            }
        }
    }

    pub fn try_analyze(&self, query: &str) -> Result<QueryAnalysis, AnalyzerError> {
        let cleaned = clean(query);
        let lowered = cleaned.to_lowercase();
        if !WORD.is_match(&lowered) {
            return Err(AnalyzerError::NoTerms(query.to_string()));
        }

        let keywords = self.keywords(&lowered);
        let entities: Vec<String> = self
            .entities
            .iter()
            .filter(|e| lowered.contains(e.as_str()))
            .cloned()
            .collect();
        let query_type = self
            .query_types
            .first_match(&lowered)
            .copied()
            .unwrap_or_default();
        let needs_expansion =
            keywords.len() < MIN_KEYWORDS || cleaned.split_whitespace().count() < MIN_WORDS;
        let expansions = self.expansions(&cleaned, &lowered, &keywords);

        Ok(QueryAnalysis {
            original_query: query.to_string(),
            cleaned_query: cleaned,
            keywords,
            entities,
            query_type,
            needs_expansion,
            expansions,
        })
    }

    fn keywords(&self, lowered: &str) -> Vec<String> {
        WORD.find_iter(lowered)
            .map(|m| m.as_str())
            .filter(|w| !self.stop_words.contains(*w) && w.chars().count() > 2)
            .map(str::to_string)
            .collect()
    }

    fn expansions(&self, cleaned: &str, lowered: &str, keywords: &[String]) -> Vec<String> {
        let mut out = Vec::new();

        for keyword in keywords {
            let group = self
                .synonyms
                .iter()
                .find(|g| g.term == *keyword || g.alternatives.iter().any(|a| a == keyword));
            if let Some(group) = group {
                for alt in &group.alternatives {
                    if !lowered.contains(alt.as_str()) {
                        out.push(format!("{} {}", cleaned, alt));
                    }
                }
            }
        }

        if !lowered.contains(&self.domain_name.to_lowercase()) {
            out.push(format!("{} {}", self.domain_name, cleaned));
        }

        out.truncate(MAX_EXPANSIONS);
        out
    }
}

/// Collapse whitespace runs and trim.
pub fn clean(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn degraded(query: &str) -> QueryAnalysis {
    let trimmed = query.trim();
    QueryAnalysis {
        original_query: query.to_string(),
        cleaned_query: query.to_string(),
        keywords: if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        },
        entities: Vec::new(),
        query_type: QueryType::Factual,
        needs_expansion: false,
        expansions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::from_vocabulary(&DomainVocabulary::default()).unwrap()
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean("  what   is\tthe\nhandbook  "), "what is the handbook");
    }

    #[test]
    fn test_keywords_drop_stop_words_and_short_tokens() {
        let a = analyzer().analyze("What is the GitLab handbook for?");
        assert_eq!(a.keywords, vec!["what", "gitlab", "handbook"]);
    }

    #[test]
    fn test_entities_by_substring() {
        let a = analyzer().analyze("How does the remote team handle onboarding?");
        assert_eq!(a.entities, vec!["team", "remote", "onboarding"]);
    }

    #[test]
    fn test_query_type_priority() {
        let az = analyzer();
        assert_eq!(az.analyze("What is a runner?").query_type, QueryType::Definition);
        assert_eq!(
            az.analyze("What is the process for releases").query_type,
            QueryType::Definition
        );
        assert_eq!(az.analyze("Release steps please").query_type, QueryType::Process);
        assert_eq!(az.analyze("GitLab vs GitHub").query_type, QueryType::Comparison);
        assert_eq!(az.analyze("List the stages").query_type, QueryType::List);
        assert_eq!(az.analyze("Who founded GitLab").query_type, QueryType::Factual);
    }

    #[test]
    fn test_needs_expansion() {
        let az = analyzer();
        assert!(az.analyze("gitlab values").needs_expansion);
        assert!(!az
            .analyze("describe gitlab engineering onboarding practices")
            .needs_expansion);
    }

    #[test]
    fn test_expansions_from_synonyms_and_domain_prefix() {
        let a = analyzer().analyze("our transparency");
        assert_eq!(
            a.expansions,
            vec![
                "our transparency openness",
                "our transparency visibility",
                "our transparency clear communication",
            ]
        );

        let a = analyzer().analyze("remote meetings");
        assert_eq!(a.expansions, vec!["GitLab remote meetings"]);
    }

    #[test]
    fn test_expansions_capped_and_skip_present_terms() {
        let a = analyzer().analyze("gitlab values and culture");
        assert_eq!(
            a.expansions,
            vec![
                "gitlab values and culture principles",
                "gitlab values and culture ethos",
                "gitlab values and culture beliefs",
            ]
        );
    }

    #[test]
    fn test_degraded_analysis_on_no_terms() {
        let az = analyzer();
        assert!(matches!(
            az.try_analyze("?!"),
            Err(AnalyzerError::NoTerms(_))
        ));
        let a = az.analyze("?!");
        assert_eq!(a.keywords, vec!["?!"]);
        assert_eq!(a.query_type, QueryType::Factual);
        assert!(a.expansions.is_empty());
        assert!(!a.needs_expansion);
    }
}
