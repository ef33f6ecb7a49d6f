//! Durable key-value storage abstraction.
//!
//! The [`KvStore`] trait is the only persistence seam in the core. Both
//! cache tiers, the metrics recorder, and saved sessions write through it,
//! each under its own namespace. Implementations are expected to be
//! crash-consistent per namespace; nothing is transactional across
//! namespaces.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreError;

/// Contents of one namespace: key → JSON value.
pub type Namespace = BTreeMap<String, serde_json::Value>;

/// Abstract durable store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](KvStore::load) | Read every key in a namespace (empty if absent) |
/// | [`save`](KvStore::save) | Replace a namespace with the given mapping |
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn load(&self, namespace: &str) -> Result<Namespace, StoreError>;

    async fn save(&self, namespace: &str, entries: &Namespace) -> Result<(), StoreError>;
}
