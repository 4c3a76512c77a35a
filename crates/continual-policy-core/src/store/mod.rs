//! Policy version store
//!
//! An append-only sequence of policy snapshots addressed by a 0-based index,
//! plus an active pointer that defines "latest". Commits append at the next
//! index and move the pointer to the new version. Rollback moves the pointer
//! back to an existing version without erasing anything; the next commit
//! still appends after the highest index.

pub mod fs;
pub mod memory;

pub use fs::FsPolicyStore;
pub use memory::InMemoryPolicyStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::collaborators::PolicyRuleSet;

/// Errors raised by policy stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// Index out of range
    #[error("Policy version {index} not found ({available} committed)")]
    VersionNotFound { index: usize, available: usize },

    /// File-system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored state is inconsistent
    #[error("Corrupt policy store: {0}")]
    Corrupt(String),

    /// A writer panicked while holding the lock
    #[error("Policy store lock poisoned")]
    Poisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// An immutable policy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// 0-based position in the sequence
    pub index: usize,
    /// Storage locator
    pub path: String,
    /// Policy text
    pub content: String,
    /// Hex SHA-256 of `content`
    pub sha256: String,
}

impl PolicyVersion {
    pub fn new(index: usize, path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            index,
            path: path.into(),
            sha256: content_digest(&content),
            content,
        }
    }
}

/// Listing entry for a stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersionSummary {
    pub index: usize,
    pub path: String,
    pub sha256: String,
    /// Whether this version is the one "latest" resolves to
    pub active: bool,
}

/// Hex SHA-256 of a policy document
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ordered, append-only policy storage.
///
/// `commit` is the only operation that creates versions; implementations
/// must serialize commits so indices are gap-free and never expose a
/// partially written version through `latest`.
#[async_trait]
pub trait PolicyStore: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Locator of the active version, `None` before the first commit
    async fn latest_path(&self) -> StoreResult<Option<String>>;

    /// The active version, `None` before the first commit
    async fn latest(&self) -> StoreResult<Option<PolicyVersion>>;

    /// Append a new version and make it the active one
    async fn commit(&self, rule_set: &PolicyRuleSet) -> StoreResult<PolicyVersion>;

    /// Read a version by index
    async fn get(&self, index: usize) -> StoreResult<PolicyVersion>;

    /// Make `index` the active version and return it. History is untouched.
    async fn rollback_to(&self, index: usize) -> StoreResult<PolicyVersion>;

    /// Every stored version in index order
    async fn list(&self) -> StoreResult<Vec<PolicyVersionSummary>>;

    /// Number of committed versions
    async fn len(&self) -> StoreResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }
}
