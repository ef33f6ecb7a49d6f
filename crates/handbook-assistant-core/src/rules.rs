//! Ordered, first-match rule tables.
//!
//! Keyword cascades that decide query type, canned templates, telemetry
//! categories, and follow-up suggestions are all expressed as data: a list
//! of `(matcher, tag)` pairs evaluated top to bottom against lowercased
//! input. The first rule whose matcher fires decides the outcome.
//!
//! ```
//! use handbook_assistant_core::rules::{Matcher, RuleTable};
//!
//! let table = RuleTable::new()
//!     .with_rule(Matcher::any(["pipeline", "deploy"]), "ci")
//!     .with_rule(Matcher::any(["merge", "review"]), "review");
//! assert_eq!(table.first_match("How do I Deploy?"), Some(&"ci"));
//! assert_eq!(table.first_match("weather"), None);
//! ```

use regex::Regex;

use crate::error::ConfigError;

/// A predicate over lowercased text.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Fires when any needle is a substring of the input.
    Any(Vec<String>),
    /// Fires when the pattern matches anywhere in the input.
    Pattern(Regex),
}

impl Matcher {
    /// Substring matcher. Needles are lowercased.
    pub fn any<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Matcher::Any(
            needles
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        )
    }

    /// Regex matcher, applied to lowercased input.
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|source| ConfigError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Test against text that is already lowercased.
    pub fn matches_lowercase(&self, lowered: &str) -> bool {
        match self {
            Matcher::Any(needles) => needles.iter().any(|n| lowered.contains(n.as_str())),
            Matcher::Pattern(re) => re.is_match(lowered),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule<T> {
    pub matcher: Matcher,
    pub tag: T,
}

/// Ordered rules; evaluation stops at the first match.
#[derive(Debug, Clone)]
pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for RuleTable<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> RuleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, matcher: Matcher, tag: T) -> Self {
        self.push(matcher, tag);
        self
    }

    pub fn push(&mut self, matcher: Matcher, tag: T) {
        self.rules.push(Rule { matcher, tag });
    }

    /// Tag of the first rule matching `text` (case-insensitive).
    pub fn first_match(&self, text: &str) -> Option<&T> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matcher.matches_lowercase(&lowered))
            .map(|r| &r.tag)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T> FromIterator<(Matcher, T)> for RuleTable<T> {
    fn from_iter<I: IntoIterator<Item = (Matcher, T)>>(iter: I) -> Self {
        Self {
            rules: iter
                .into_iter()
                .map(|(matcher, tag)| Rule { matcher, tag })
                .collect(),
        }
    }
}
