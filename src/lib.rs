//! # Handbook Assistant
//!
//! A domain-scoped question answering assistant. Answers come from a
//! two-tier response cache, canned templates, or a hosted text-generation
//! service grounded on passages from hybrid (keyword + semantic) retrieval.
//!
//! The pipeline logic lives in `handbook_assistant_core`; this crate wires
//! it to SQLite, HTTP services, a TOML config, and the `hba` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────────────────┐   ┌──────────┐
//! │   CLI    │──▶│ Assistant::handle                        │──▶│ Generator│
//! │  (hba)   │   │ cache → template → enforce → retrieve    │   │ (HTTP)   │
//! └──────────┘   └──────┬────────────────────────┬──────────┘   └──────────┘
//!                       ▼                        ▼
//!                 ┌──────────┐            ┌──────────────┐
//!                 │  SQLite  │            │ Keyword index│
//!                 │ kv store │            │ + semantic   │
//!                 └──────────┘            └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hba init                          # create database
//! hba ask "What is GitLab?"         # one turn
//! hba chat                          # interactive session
//! hba search "merge request review" # retrieval only
//! hba cache stats
//! hba metrics
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite key-value store |
//! | [`corpus`] | Document chunk loading |
//! | [`generation`] | Text generation providers |
//! | [`semantic`] | Semantic search providers |
//! | [`chat`] | The chat pipeline and sessions |
//! | [`bootstrap`] | Component wiring |
//! | [`logging`] | Tracing subscriber setup |

pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod corpus;
pub mod db;
pub mod generation;
pub mod logging;
pub mod migrate;
pub mod repl;
pub mod search;
pub mod semantic;
pub mod sqlite_store;
pub mod stats;
