//! Follow-up question suggestions.

use crate::domain::DomainVocabulary;
use crate::rules::RuleTable;

/// Picks topical follow-ups by first-match rule, then pads with general ones.
#[derive(Debug, Clone)]
pub struct FollowUpSuggester {
    topical: RuleTable<Vec<String>>,
    general: Vec<String>,
    max: usize,
}

impl FollowUpSuggester {
    pub fn from_vocabulary(vocab: &DomainVocabulary) -> Self {
        Self {
            topical: vocab.suggestion_table(),
            general: vocab.suggestions.general.clone(),
            max: vocab.suggestions.max,
        }
    }

    /// Up to `max` distinct suggestions, topical first.
    pub fn suggest(&self, query: &str) -> Vec<String> {
        let topical = self.topical.first_match(query).into_iter().flatten();
        let mut out: Vec<String> = Vec::with_capacity(self.max);
        for s in topical.chain(self.general.iter()) {
            if out.len() == self.max {
                break;
            }
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggester() -> FollowUpSuggester {
        FollowUpSuggester::from_vocabulary(&DomainVocabulary::default())
    }

    #[test]
    fn test_topical_first() {
        let s = suggester().suggest("How does code review happen?");
        assert_eq!(s.len(), 4);
        assert_eq!(s[0], "What is GitLab's merge request process?");
        assert_eq!(s[1], "How does GitLab ensure code quality?");
    }

    #[test]
    fn test_first_rule_wins() {
        // "work" hits the remote rule before "review" reaches the code rule.
        let s = suggester().suggest("how do reviews work");
        assert_eq!(s[0], "What tools does GitLab use for remote collaboration?");
    }

    #[test]
    fn test_general_only() {
        let s = suggester().suggest("who is the ceo");
        assert_eq!(
            s,
            vec![
                "Can you tell me more about GitLab's remote work culture?",
                "How does GitLab handle performance reviews?",
                "What are GitLab's core values?",
                "How does the GitLab development process work?",
            ]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        let mut vocab = DomainVocabulary::default();
        vocab.suggestions.topical[0]
            .suggestions
            .push("What are GitLab's core values?".to_string());
        vocab.suggestions.max = 10;
        let s = FollowUpSuggester::from_vocabulary(&vocab).suggest("remote");
        assert_eq!(s.len(), 6);
    }
}
