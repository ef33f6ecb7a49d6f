//! # Handbook Assistant Core
//!
//! Pipeline logic for a domain-scoped question answering assistant:
//! keyword indexing, query analysis, domain enforcement, hybrid retrieval,
//! two-tier response caching, conversation memory, and telemetry.
//!
//! This crate performs no network, database, or filesystem I/O. External
//! services are reached through the collaborator traits
//! [`semantic::SemanticSearch`], [`generation::Generator`],
//! [`store::KvStore`], and [`telemetry::TelemetrySink`]; the application
//! crate supplies the concrete implementations.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Shared data types (chunks, search results, token accounting) |
//! | [`error`] | Typed errors for every collaborator seam |
//! | [`rules`] | Ordered first-match rule tables |
//! | [`domain`] | Controlled vocabulary describing the target domain |
//! | [`keyword`] | TF-IDF keyword index |
//! | [`analyzer`] | Query classification, keyword/entity extraction, expansion |
//! | [`enforcer`] | Conversation-scoped domain enforcement |
//! | [`search`] | Hybrid retrieval: fusion and rerank |
//! | [`cache`] | Exact and fuzzy response cache tiers |
//! | [`memory`] | Bounded conversation history |
//! | [`suggestions`] | Follow-up question suggestions |
//! | [`telemetry`] | Query metrics and performance summary |

pub mod analyzer;
pub mod cache;
pub mod domain;
pub mod enforcer;
pub mod error;
pub mod generation;
pub mod keyword;
pub mod memory;
pub mod models;
pub mod rules;
pub mod search;
pub mod semantic;
pub mod store;
pub mod suggestions;
pub mod telemetry;
