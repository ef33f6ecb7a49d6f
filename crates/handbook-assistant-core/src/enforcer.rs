//! Conversation-scoped domain enforcement.
//!
//! Each conversation carries a [`ConversationDomainState`]: a focused /
//! not-focused macro-state modulated by a continuous confidence score and
//! the last recognized sub-topic. [`DomainEnforcer`] holds the immutable
//! vocabulary and thresholds and is shared by all sessions; the state is
//! passed in explicitly on every call.
//!
//! # Intent cascade
//!
//! First match wins:
//!
//! | Signal | Confidence |
//! |--------|------------|
//! | explicit domain-name mention | 1.0 |
//! | known domain phrase | 0.9 |
//! | two or more domain keywords | 0.8 |
//! | exactly one domain keyword | 0.6 |
//! | conversation already focused (inherited) | 0.5 |
//! | ambiguous technical term | 0.4 |
//! | none | 0.0 |
//!
//! Transitions are recomputed from scratch each turn.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DomainVocabulary, IntentVocabulary, PromptTexts};

/// Confidence cut-offs used by the enforcer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerThresholds {
    /// At or above: pass the query through unchanged.
    pub pass: f64,
    /// At or above (and below `pass`): prepend the context reminder.
    /// Also the focus threshold applied by [`DomainEnforcer::update`].
    pub remind: f64,
    /// Below, on an unfocused conversation: redirect.
    pub redirect: f64,
    /// Maximum history entries kept per conversation.
    pub history_cap: usize,
}

impl Default for EnforcerThresholds {
    fn default() -> Self {
        Self {
            pass: 0.6,
            remind: 0.4,
            redirect: 0.3,
            history_cap: 10,
        }
    }
}

/// Where an intent decision came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentSignal {
    ExplicitMention,
    Phrase(String),
    /// Up to three of the matched keywords.
    Keywords(Vec<String>),
    Keyword(String),
    /// Inherited from a conversation that is already focused.
    Conversation,
    Ambiguous(usize),
    Unrelated,
}

impl fmt::Display for IntentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentSignal::ExplicitMention => f.write_str("explicit_mention"),
            IntentSignal::Phrase(p) => write!(f, "phrase: {}", p),
            IntentSignal::Keywords(k) => write!(f, "keywords: {}", k.join(", ")),
            IntentSignal::Keyword(k) => write!(f, "keyword: {}", k),
            IntentSignal::Conversation => f.write_str("conversation_context"),
            IntentSignal::Ambiguous(n) => write!(f, "ambiguous_technical: {} terms", n),
            IntentSignal::Unrelated => f.write_str("not_domain_related"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainIntent {
    pub is_domain: bool,
    pub confidence: f64,
    pub signal: IntentSignal,
}

impl DomainIntent {
    fn new(confidence: f64, signal: IntentSignal) -> Self {
        Self {
            is_domain: !matches!(signal, IntentSignal::Unrelated),
            confidence,
            signal,
        }
    }

    pub fn topic(&self) -> String {
        self.signal.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementAction {
    PassThrough,
    Remind,
    Reframe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub query: String,
    pub response: String,
    pub is_domain: bool,
    pub confidence: f64,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-conversation enforcement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDomainState {
    pub is_domain_focused: bool,
    pub last_topic: Option<String>,
    pub confidence: f64,
    pub history: VecDeque<TurnRecord>,
}

impl ConversationDomainState {
    /// Fresh state. `focused` chooses the starting macro-state.
    pub fn new(focused: bool) -> Self {
        Self {
            is_domain_focused: focused,
            last_topic: None,
            confidence: if focused { 1.0 } else { 0.0 },
            history: VecDeque::new(),
        }
    }
}

impl Default for ConversationDomainState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Snapshot returned by [`DomainEnforcer::summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainSummary {
    pub is_domain_focused: bool,
    pub confidence: f64,
    pub last_topic: Option<String>,
    pub conversation_count: usize,
    pub recent_topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DomainEnforcer {
    domain_name: String,
    vocab: IntentVocabulary,
    prompts: PromptTexts,
    thresholds: EnforcerThresholds,
}

impl DomainEnforcer {
    pub fn new(vocab: &DomainVocabulary, thresholds: EnforcerThresholds) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items.iter().map(|s| s.to_lowercase()).collect()
        };
        Self {
            domain_name: vocab.name.clone(),
            vocab: IntentVocabulary {
                keywords: lower(&vocab.intent.keywords),
                phrases: lower(&vocab.intent.phrases),
                ambiguous_terms: lower(&vocab.intent.ambiguous_terms),
            },
            prompts: vocab.prompts.clone(),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &EnforcerThresholds {
        &self.thresholds
    }

    pub fn detect_intent(&self, query: &str, state: &ConversationDomainState) -> DomainIntent {
        let q = query.trim().to_lowercase();

        if q.contains(&self.domain_name.to_lowercase()) {
            return DomainIntent::new(1.0, IntentSignal::ExplicitMention);
        }

        if let Some(phrase) = self.vocab.phrases.iter().find(|p| q.contains(p.as_str())) {
            return DomainIntent::new(0.9, IntentSignal::Phrase(phrase.clone()));
        }

        let matched: Vec<&String> = self
            .vocab
            .keywords
            .iter()
            .filter(|k| q.contains(k.as_str()))
            .collect();
        match matched.len() {
            0 => {}
            1 => return DomainIntent::new(0.6, IntentSignal::Keyword(matched[0].clone())),
            _ => {
                let shown = matched.iter().take(3).map(|k| k.to_string()).collect();
                return DomainIntent::new(0.8, IntentSignal::Keywords(shown));
            }
        }

        if state.is_domain_focused {
            return DomainIntent::new(0.5, IntentSignal::Conversation);
        }

        let ambiguous = self
            .vocab
            .ambiguous_terms
            .iter()
            .filter(|t| q.contains(t.as_str()))
            .count();
        if ambiguous > 0 {
            return DomainIntent::new(0.4, IntentSignal::Ambiguous(ambiguous));
        }

        DomainIntent::new(0.0, IntentSignal::Unrelated)
    }

    pub fn decide(&self, intent: &DomainIntent) -> EnforcementAction {
        if intent.confidence >= self.thresholds.pass {
            EnforcementAction::PassThrough
        } else if intent.confidence >= self.thresholds.remind {
            EnforcementAction::Remind
        } else {
            EnforcementAction::Reframe
        }
    }

    /// Query rewritten for the action its intent calls for.
    pub fn rewrite(&self, query: &str, state: &ConversationDomainState) -> String {
        let intent = self.detect_intent(query, state);
        match self.decide(&intent) {
            EnforcementAction::PassThrough => query.to_string(),
            EnforcementAction::Remind => {
                format!("{}\n\n{}", self.prompts.context_reminder, query)
            }
            EnforcementAction::Reframe => match &state.last_topic {
                Some(topic) => format!("Regarding {} {}, {}", self.domain_name, topic, query),
                None => format!("In the context of {}, {}", self.domain_name, query),
            },
        }
    }

    /// True only for low-confidence queries in an unfocused conversation.
    pub fn should_redirect(&self, query: &str, state: &ConversationDomainState) -> bool {
        let intent = self.detect_intent(query, state);
        intent.confidence < self.thresholds.redirect && !state.is_domain_focused
    }

    pub fn redirect_message(&self, state: &ConversationDomainState) -> String {
        match &state.last_topic {
            Some(topic) => self.prompts.redirect_with_topic.replace("{topic}", topic),
            None => self.prompts.clarification.clone(),
        }
    }

    /// System instruction matched to how clearly on-topic the query is.
    pub fn system_prompt(&self, query: &str, state: &ConversationDomainState) -> String {
        let intent = self.detect_intent(query, state);
        match self.decide(&intent) {
            EnforcementAction::PassThrough => self.prompts.primary.clone(),
            EnforcementAction::Remind => {
                format!("{}\n\n{}", self.prompts.primary, self.prompts.context_reminder)
            }
            EnforcementAction::Reframe => {
                format!("{}\n\n{}", self.prompts.primary, self.prompts.clarification)
            }
        }
    }

    pub fn update(&self, state: &mut ConversationDomainState, query: &str, response: &str) {
        self.update_at(state, query, response, Utc::now());
    }

    pub fn update_at(
        &self,
        state: &mut ConversationDomainState,
        query: &str,
        response: &str,
        now: DateTime<Utc>,
    ) {
        let intent = self.detect_intent(query, state);
        let topic = intent.topic();

        state.confidence = intent.confidence;
        if intent.confidence >= self.thresholds.remind {
            state.is_domain_focused = true;
            if intent.signal != IntentSignal::Conversation {
                state.last_topic = Some(topic.clone());
            }
        } else {
            state.is_domain_focused = false;
        }

        state.history.push_back(TurnRecord {
            query: query.to_string(),
            response: response.to_string(),
            is_domain: intent.is_domain,
            confidence: intent.confidence,
            topic,
            timestamp: now,
        });
        while state.history.len() > self.thresholds.history_cap {
            state.history.pop_front();
        }

        debug!(
            focused = state.is_domain_focused,
            confidence = state.confidence,
            "updated conversation domain state"
        );
    }

    pub fn summary(&self, state: &ConversationDomainState) -> DomainSummary {
        let skip = state.history.len().saturating_sub(3);
        DomainSummary {
            is_domain_focused: state.is_domain_focused,
            confidence: state.confidence,
            last_topic: state.last_topic.clone(),
            conversation_count: state.history.len(),
            recent_topics: state.history.iter().skip(skip).map(|t| t.topic.clone()).collect(),
        }
    }
}
