//! Controlled vocabulary for the target knowledge domain.
//!
//! Every keyword list, phrase list, canned answer, and prompt text that
//! steers the pipeline lives in [`DomainVocabulary`]. The defaults describe
//! the GitLab handbook; an application can override any field from its
//! configuration file (missing fields keep their defaults).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::QueryType;
use crate::rules::{Matcher, RuleTable};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The complete domain description consumed by the core components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainVocabulary {
    /// Display name of the domain, e.g. `"GitLab"`.
    pub name: String,
    /// Terms extracted as entities by substring match.
    pub entities: Vec<String>,
    /// Synonym groups used for query expansion, in priority order.
    pub synonyms: Vec<SynonymGroup>,
    /// Words dropped during keyword extraction.
    pub stop_words: Vec<String>,
    /// Query type patterns, evaluated in order.
    pub query_patterns: Vec<QueryPattern>,
    /// Content markers that earn the definition rerank boost.
    pub definition_markers: Vec<String>,
    /// Content markers that earn the process rerank boost.
    pub process_markers: Vec<String>,
    pub intent: IntentVocabulary,
    pub cache: CacheVocabulary,
    pub prompts: PromptTexts,
    /// Canned answers checked before any external call.
    pub templates: Vec<TemplateRule>,
    /// Telemetry categories; queries matching none are `fallback_category`.
    pub categories: Vec<CategoryRule>,
    pub fallback_category: String,
    pub suggestions: SuggestionVocabulary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub term: String,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPattern {
    pub query_type: QueryType,
    pub pattern: String,
}

/// Vocabulary for the intent cascade of the domain enforcer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentVocabulary {
    pub keywords: Vec<String>,
    pub phrases: Vec<String>,
    pub ambiguous_terms: Vec<String>,
}

/// Vocabulary for the fuzzy cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheVocabulary {
    /// Filler phrases stripped before hashing a fuzzy key.
    pub filler_phrases: Vec<String>,
    /// Words ignored by the similarity function.
    pub stop_words: Vec<String>,
    /// Shared terms that earn the similarity boost.
    pub domain_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTexts {
    /// Primary system instruction for generation.
    pub primary: String,
    /// Prefix added to moderately on-topic queries.
    pub context_reminder: String,
    /// Asked when the domain cannot be inferred.
    pub clarification: String,
    pub fallback: String,
    /// Redirect used when a last topic is known; `{topic}` is substituted.
    pub redirect_with_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRule {
    pub key: String,
    pub triggers: Vec<String>,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionVocabulary {
    pub general: Vec<String>,
    pub topical: Vec<SuggestionRule>,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRule {
    pub triggers: Vec<String>,
    pub suggestions: Vec<String>,
}

/// A canned answer selected by [`DomainVocabulary::template_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub key: String,
    pub response: String,
}

impl DomainVocabulary {
    /// Query type classifier built from [`query_patterns`](Self::query_patterns).
    pub fn query_type_table(&self) -> Result<RuleTable<QueryType>, ConfigError> {
        self.query_patterns
            .iter()
            .map(|p| -> Result<_, ConfigError> {
                Ok((Matcher::pattern(&p.pattern)?, p.query_type))
            })
            .collect()
    }

    pub fn template_table(&self) -> RuleTable<Template> {
        self.templates
            .iter()
            .map(|t| {
                (
                    Matcher::any(&t.triggers),
                    Template {
                        key: t.key.clone(),
                        response: t.response.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn category_table(&self) -> RuleTable<String> {
        self.categories
            .iter()
            .map(|c| (Matcher::any(&c.triggers), c.name.clone()))
            .collect()
    }

    pub fn suggestion_table(&self) -> RuleTable<Vec<String>> {
        self.suggestions
            .topical
            .iter()
            .map(|s| (Matcher::any(&s.triggers), s.suggestions.clone()))
            .collect()
    }
}

impl Default for DomainVocabulary {
    fn default() -> Self {
        Self {
            name: "GitLab".to_string(),
            entities: strings(&[
                "gitlab",
                "handbook",
                "direction",
                "company",
                "team",
                "remote",
                "values",
                "culture",
                "hiring",
                "onboarding",
                "development",
            ]),
            synonyms: vec![
                synonym("values", &["principles", "ethos", "culture", "beliefs"]),
                synonym(
                    "collaboration",
                    &["teamwork", "cooperation", "working together"],
                ),
                synonym(
                    "transparency",
                    &["openness", "visibility", "clear communication"],
                ),
                synonym("iteration", &["improvement", "incremental", "agile"]),
                synonym("efficiency", &["productivity", "performance", "optimization"]),
                synonym("diversity", &["inclusion", "belonging", "equity"]),
                synonym("results", &["outcomes", "achievements", "deliverables"]),
            ],
            stop_words: strings(&[
                "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have",
                "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
                "might", "must", "can", "to", "of", "in", "on", "at", "by", "for", "with",
                "about", "against", "between", "into", "through", "during", "before", "after",
                "above", "below", "up", "down", "out", "off", "over", "under", "again",
                "further", "then", "once",
            ]),
            query_patterns: vec![
                pattern(QueryType::Definition, r"\b(what is|define|meaning|definition)\b"),
                pattern(QueryType::Process, r"\b(how to|process|procedure|steps|workflow)\b"),
                pattern(QueryType::Comparison, r"\b(compare|difference|versus|vs|better)\b"),
                pattern(QueryType::List, r"\b(list|examples|types|kinds|categories)\b"),
            ],
            definition_markers: strings(&["define", "definition", "refers to", "means"]),
            process_markers: strings(&["step", "process", "how"]),
            intent: IntentVocabulary::default(),
            cache: CacheVocabulary::default(),
            prompts: PromptTexts::default(),
            templates: default_templates(),
            categories: vec![
                category("GitLab", &["gitlab", "git", "repository", "repo"]),
                category("CI/CD", &["ci", "cd", "pipeline", "deploy"]),
                category("Code Review", &["merge", "pull request", "mr", "review"]),
                category("Issues", &["issue", "bug", "feature", "task"]),
                category("Documentation", &["documentation", "docs", "help"]),
            ],
            fallback_category: "General".to_string(),
            suggestions: SuggestionVocabulary::default(),
        }
    }
}

impl Default for IntentVocabulary {
    fn default() -> Self {
        Self {
            keywords: strings(&[
                "gitlab", "git", "repository", "repo", "merge request", "mr", "pull request",
                "pr", "ci", "cd", "pipeline", "deploy", "deployment", "issue", "bug", "feature",
                "task", "handbook", "direction", "culture", "values", "process", "workflow",
                "team", "code review", "review", "approval", "branch", "commit", "push",
                "clone", "fork", "project", "group", "namespace", "user", "member",
                "permission", "security", "vulnerability", "scan", "audit", "compliance",
                "license", "documentation", "wiki", "pages", "snippets", "packages",
                "registry", "container", "docker", "kubernetes", "helm", "terraform",
                "monitoring", "observability", "metrics", "logging", "alerting", "incident",
                "response", "sre", "devops", "platform", "infrastructure",
            ]),
            phrases: strings(&[
                "gitlab ci/cd",
                "gitlab pipeline",
                "gitlab workflow",
                "gitlab process",
                "gitlab handbook",
                "gitlab direction",
                "gitlab culture",
                "gitlab values",
                "gitlab team",
                "gitlab project",
                "gitlab group",
                "gitlab user",
                "gitlab security",
                "gitlab compliance",
                "gitlab documentation",
            ]),
            ambiguous_terms: strings(&[
                "pipeline",
                "deploy",
                "repository",
                "merge",
                "review",
                "issue",
                "project",
                "team",
                "workflow",
                "process",
                "security",
                "compliance",
            ]),
        }
    }
}

impl Default for CacheVocabulary {
    fn default() -> Self {
        Self {
            filler_phrases: strings(&["what", "how", "tell me", "explain", "can you", "please"]),
            stop_words: strings(&[
                "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
                "with", "by", "is", "are", "was", "were", "be", "been", "have", "has", "had",
                "do", "does", "did", "will", "would", "could", "should", "can", "may", "might",
                "must", "shall", "we", "you", "i", "me", "my", "our", "us",
            ]),
            domain_terms: strings(&[
                "gitlab", "pr", "mr", "merge", "request", "pull", "comment", "review", "code",
                "pipeline", "ci", "cd", "deploy", "issue", "bug", "feature",
            ]),
        }
    }
}

impl Default for PromptTexts {
    fn default() -> Self {
        Self {
            primary: "You are a GitLab AI Assistant focused exclusively on GitLab's products, \
culture, processes, and practices. Your expertise covers:\n\n\
- GitLab Handbook, Direction, and company culture\n\
- GitLab CI/CD pipelines, workflows, and DevOps practices\n\
- GitLab project management, issues, and merge requests\n\
- GitLab security, compliance, and best practices\n\
- GitLab platform features and capabilities\n\
- GitLab team collaboration and communication\n\n\
Always maintain GitLab context in your responses. If a question is ambiguous or off-topic, \
gently guide users back to GitLab-related topics."
                .to_string(),
            context_reminder: "Given we are discussing GitLab, please answer the following \
question in the context of GitLab's products, processes, and culture:"
                .to_string(),
            clarification: "I'm here to assist you with GitLab-related questions. Could you \
please specify how I can help regarding GitLab's products, processes, or culture?"
                .to_string(),
            fallback: "Could you please specify your question about GitLab's procedures, \
features, or culture? I'm here to help with GitLab-related topics."
                .to_string(),
            redirect_with_topic: "I notice you're asking about something outside of GitLab \
context. Since we've been discussing GitLab {topic}, would you like to ask about that \
instead? Or if you have a GitLab-related question, I'd be happy to help!"
                .to_string(),
        }
    }
}

impl Default for SuggestionVocabulary {
    fn default() -> Self {
        Self {
            general: strings(&[
                "Can you tell me more about GitLab's remote work culture?",
                "How does GitLab handle performance reviews?",
                "What are GitLab's core values?",
                "How does the GitLab development process work?",
            ]),
            topical: vec![
                suggestion(
                    &["remote", "work"],
                    &[
                        "What tools does GitLab use for remote collaboration?",
                        "How does GitLab onboard remote employees?",
                    ],
                ),
                suggestion(
                    &["code", "review"],
                    &[
                        "What is GitLab's merge request process?",
                        "How does GitLab ensure code quality?",
                    ],
                ),
                suggestion(
                    &["hiring", "interview"],
                    &[
                        "What is GitLab's interview process like?",
                        "How does GitLab evaluate candidates?",
                    ],
                ),
                suggestion(
                    &["values", "culture"],
                    &[
                        "How does GitLab live its values in practice?",
                        "What makes GitLab's culture unique?",
                    ],
                ),
            ],
            max: 4,
        }
    }
}

fn synonym(term: &str, alternatives: &[&str]) -> SynonymGroup {
    SynonymGroup {
        term: term.to_string(),
        alternatives: strings(alternatives),
    }
}

fn pattern(query_type: QueryType, pattern: &str) -> QueryPattern {
    QueryPattern {
        query_type,
        pattern: pattern.to_string(),
    }
}

fn category(name: &str, triggers: &[&str]) -> CategoryRule {
    CategoryRule {
        name: name.to_string(),
        triggers: strings(triggers),
    }
}

fn suggestion(triggers: &[&str], suggestions: &[&str]) -> SuggestionRule {
    SuggestionRule {
        triggers: strings(triggers),
        suggestions: strings(suggestions),
    }
}

fn template(key: &str, triggers: &[&str], response: &str) -> TemplateRule {
    TemplateRule {
        key: key.to_string(),
        triggers: strings(triggers),
        response: response.to_string(),
    }
}

fn default_templates() -> Vec<TemplateRule> {
    vec![
        template(
            "gitlab_overview",
            &[
                "what is gitlab",
                "what is git lab",
                "tell me about gitlab",
                "explain gitlab",
                "describe gitlab",
                "gitlab overview",
                "what does gitlab do",
                "gitlab company",
                "about gitlab",
            ],
            "GitLab is a complete DevOps platform that provides a single application for the \
entire software development lifecycle. We're a fully remote company with team members in over \
65 countries. GitLab offers source code management, CI/CD, security scanning, project \
management, and more - all in one platform. Our core values are Results, Efficiency, \
Diversity, Iteration, and Transparency.",
        ),
        template(
            "gitlab_values",
            &["values", "culture", "principles", "what does gitlab believe"],
            "GitLab's core values are Results, Efficiency, Diversity, Iteration, and \
Transparency. These values guide everything we do, from how we work remotely to how we develop \
software. We believe in results over hours worked, efficiency through automation, diversity in \
all forms, iteration over perfection, and transparency in everything we do.",
        ),
        template(
            "remote_work",
            &["remote", "work from home", "distributed", "async"],
            "GitLab is a fully remote company with team members in over 65 countries. We believe \
in asynchronous communication, transparency, and results-oriented work. Our remote work \
culture emphasizes trust, clear documentation, and making work visible to everyone. We use \
GitLab itself for most of our work processes.",
        ),
        template(
            "ci_cd_basics",
            &["ci/cd", "pipeline", "continuous integration", "deploy"],
            "GitLab CI/CD is our built-in continuous integration and deployment tool. It uses \
YAML configuration files (.gitlab-ci.yml) to define pipelines that automatically build, test, \
and deploy your code. Pipelines run in stages (build, test, deploy) and can be triggered by \
commits, merge requests, or schedules.",
        ),
        template(
            "hiring_process",
            &["hiring", "interview", "recruitment", "how to get hired"],
            "GitLab's hiring process is designed to be transparent and efficient. We use \
structured interviews, work samples, and cultural fit assessments. The process typically \
includes a phone screen, technical interview, and final interview with the hiring manager. We \
value diversity and inclusion in all our hiring decisions.",
        ),
        template(
            "company_culture",
            &[
                "company culture",
                "how does gitlab work",
                "what makes gitlab different",
            ],
            "GitLab's culture is built on our values and our all-remote work model. We emphasize \
transparency, iteration, and results. Our handbook is public, our meetings are recorded, and \
we share our learnings openly. We believe in working asynchronously and making work visible to \
everyone.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns_compile() {
        let table = DomainVocabulary::default().query_type_table().unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_template_table_order() {
        let vocab = DomainVocabulary::default();
        let table = vocab.template_table();
        let hit = table.first_match("What is GitLab?").unwrap();
        assert_eq!(hit.key, "gitlab_overview");
        let hit = table.first_match("Tell me about the hiring steps").unwrap();
        assert_eq!(hit.key, "hiring_process");
        assert!(table.first_match("best pizza in naples").is_none());
    }

    #[test]
    fn test_category_table() {
        let vocab = DomainVocabulary::default();
        let table = vocab.category_table();
        assert_eq!(
            table.first_match("how do pipelines deploy").map(String::as_str),
            Some("CI/CD")
        );
        assert_eq!(table.first_match("lunch"), None);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let vocab: DomainVocabulary =
            serde_json::from_str(r#"{"name": "Acme", "entities": ["acme"]}"#).unwrap();
        assert_eq!(vocab.name, "Acme");
        assert_eq!(vocab.entities, vec!["acme".to_string()]);
        assert!(!vocab.intent.keywords.is_empty());
        assert_eq!(vocab.suggestions.max, 4);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut vocab = DomainVocabulary::default();
        vocab.query_patterns.push(QueryPattern {
            query_type: QueryType::List,
            pattern: "[".to_string(),
        });
        assert!(vocab.query_type_table().is_err());
    }
}
