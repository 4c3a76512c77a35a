//! File-system policy store
//!
//! Layout of the store directory:
//!
//! ```text
//! v0000.json   first committed version
//! v0001.json
//! LATEST       index of the active version
//! ```
//!
//! Documents and the pointer are written to a hidden temporary file and
//! renamed into place, so a reader that follows `LATEST` only ever sees a
//! complete document. Commits and rollbacks are serialized by a writer lock;
//! the store assumes a single writing process per directory.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{PolicyStore, PolicyVersion, PolicyVersionSummary, StoreError, StoreResult};
use crate::collaborators::PolicyRuleSet;

const POINTER_FILE: &str = "LATEST";

fn version_file_name(index: usize) -> String {
    format!("v{:04}.json", index)
}

fn parse_version_file_name(name: &str) -> Option<usize> {
    name.strip_prefix('v')?.strip_suffix(".json")?.parse().ok()
}

async fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Corrupt(format!("invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", name));

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Policy store backed by a directory of text documents
#[derive(Debug)]
pub struct FsPolicyStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsPolicyStore {
    /// Open (and create if needed) a store directory
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            write_lock: Mutex::new(()),
        };
        // Surface gaps or a dangling pointer at startup
        let (count, _) = store.snapshot().await?;

        tracing::info!(
            dir = %store.dir.display(),
            versions = count,
            "Opened policy store"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn version_path(&self, index: usize) -> PathBuf {
        self.dir.join(version_file_name(index))
    }

    fn locator(&self, index: usize) -> String {
        self.version_path(index).display().to_string()
    }

    /// Number of versions, verifying indices are gap-free
    async fn count(&self) -> StoreResult<usize> {
        let mut indices = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry.file_name().to_str().and_then(parse_version_file_name) {
                indices.push(index);
            }
        }
        indices.sort_unstable();

        for (expected, actual) in indices.iter().enumerate() {
            if expected != *actual {
                return Err(StoreError::Corrupt(format!(
                    "missing version {} in {}",
                    expected,
                    self.dir.display()
                )));
            }
        }
        Ok(indices.len())
    }

    async fn read_pointer(&self) -> StoreResult<Option<usize>> {
        match tokio::fs::read_to_string(self.dir.join(POINTER_FILE)).await {
            Ok(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                StoreError::Corrupt(format!("unreadable {} pointer: {:?}", POINTER_FILE, raw))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Version count and the index "latest" resolves to: the pointer, or the
    /// highest index without one.
    ///
    /// The pointer is read before the directory is scanned. A commit renames
    /// its document into place before moving the pointer, so a pointer past
    /// the scanned count means the directory is inconsistent, not that a
    /// commit is in flight.
    async fn snapshot(&self) -> StoreResult<(usize, Option<usize>)> {
        let pointer = self.read_pointer().await?;
        let count = self.count().await?;

        match pointer {
            Some(index) if index >= count => Err(StoreError::Corrupt(format!(
                "{} points at version {} but only {} exist",
                POINTER_FILE, index, count
            ))),
            Some(index) => Ok((count, Some(index))),
            None => Ok((count, count.checked_sub(1))),
        }
    }

    async fn write_pointer(&self, index: usize) -> StoreResult<()> {
        write_atomic(&self.dir.join(POINTER_FILE), index.to_string().as_bytes()).await
    }

    async fn read_version(&self, index: usize, count: usize) -> StoreResult<PolicyVersion> {
        if index >= count {
            return Err(StoreError::VersionNotFound {
                index,
                available: count,
            });
        }
        let content = tokio::fs::read_to_string(self.version_path(index)).await?;
        Ok(PolicyVersion::new(index, self.locator(index), content))
    }
}

#[async_trait]
impl PolicyStore for FsPolicyStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn latest_path(&self) -> StoreResult<Option<String>> {
        let (_, active) = self.snapshot().await?;
        Ok(active.map(|index| self.locator(index)))
    }

    async fn latest(&self) -> StoreResult<Option<PolicyVersion>> {
        let (count, active) = self.snapshot().await?;
        match active {
            Some(index) => Ok(Some(self.read_version(index, count).await?)),
            None => Ok(None),
        }
    }

    async fn commit(&self, rule_set: &PolicyRuleSet) -> StoreResult<PolicyVersion> {
        let _guard = self.write_lock.lock().await;

        let index = self.count().await?;
        let content = rule_set.render();
        write_atomic(&self.version_path(index), content.as_bytes()).await?;
        self.write_pointer(index).await?;

        tracing::info!(index, dir = %self.dir.display(), "Committed policy version");
        Ok(PolicyVersion::new(index, self.locator(index), content))
    }

    async fn get(&self, index: usize) -> StoreResult<PolicyVersion> {
        let count = self.count().await?;
        self.read_version(index, count).await
    }

    async fn rollback_to(&self, index: usize) -> StoreResult<PolicyVersion> {
        let _guard = self.write_lock.lock().await;

        let count = self.count().await?;
        let version = self.read_version(index, count).await?;
        self.write_pointer(index).await?;

        tracing::info!(index, dir = %self.dir.display(), "Rolled back policy pointer");
        Ok(version)
    }

    async fn list(&self) -> StoreResult<Vec<PolicyVersionSummary>> {
        let (count, active) = self.snapshot().await?;

        let mut summaries = Vec::with_capacity(count);
        for index in 0..count {
            let version = self.read_version(index, count).await?;
            summaries.push(PolicyVersionSummary {
                index,
                path: version.path,
                sha256: version.sha256,
                active: active == Some(index),
            });
        }
        Ok(summaries)
    }

    async fn len(&self) -> StoreResult<usize> {
        self.count().await
    }
}
