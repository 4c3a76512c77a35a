//! In-memory policy store

use async_trait::async_trait;
use std::sync::RwLock;

use super::{PolicyStore, PolicyVersion, PolicyVersionSummary, StoreError, StoreResult};
use crate::collaborators::PolicyRuleSet;

#[derive(Debug, Default)]
struct Versions {
    versions: Vec<PolicyVersion>,
    active: Option<usize>,
}

/// Policy store held in process memory.
///
/// A single `RwLock` covers both the version list and the active pointer,
/// so commit is atomic with respect to readers of `latest`.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<Versions>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locator(index: usize) -> String {
        format!("memory://policies/v{}", index)
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn latest_path(&self) -> StoreResult<Option<String>> {
        Ok(self.latest().await?.map(|v| v.path))
    }

    async fn latest(&self) -> StoreResult<Option<PolicyVersion>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.active.and_then(|i| state.versions.get(i).cloned()))
    }

    async fn commit(&self, rule_set: &PolicyRuleSet) -> StoreResult<PolicyVersion> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let index = state.versions.len();
        let version = PolicyVersion::new(index, Self::locator(index), rule_set.render());
        state.versions.push(version.clone());
        state.active = Some(index);
        Ok(version)
    }

    async fn get(&self, index: usize) -> StoreResult<PolicyVersion> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        state
            .versions
            .get(index)
            .cloned()
            .ok_or(StoreError::VersionNotFound {
                index,
                available: state.versions.len(),
            })
    }

    async fn rollback_to(&self, index: usize) -> StoreResult<PolicyVersion> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let version = state
            .versions
            .get(index)
            .cloned()
            .ok_or(StoreError::VersionNotFound {
                index,
                available: state.versions.len(),
            })?;
        state.active = Some(index);
        Ok(version)
    }

    async fn list(&self) -> StoreResult<Vec<PolicyVersionSummary>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .versions
            .iter()
            .map(|v| PolicyVersionSummary {
                index: v.index,
                path: v.path.clone(),
                sha256: v.sha256.clone(),
                active: state.active == Some(v.index),
            })
            .collect())
    }
}
