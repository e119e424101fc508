//! Object storage seam for raw test artifacts.
//!
//! Keys follow `{lob_id}/{team_id}/{job_id}/{file_name}` under the
//! configured container. The backing store is an external collaborator;
//! the filesystem implementation covers single-node deployments and the
//! in-memory one backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use tokio::sync::Mutex;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Compose the canonical artifact key.
pub fn artifact_key(lob_id: &str, team_id: &str, job_id: &uuid::Uuid, file_name: &str) -> String {
    format!("{lob_id}/{team_id}/{job_id}/{file_name}")
}

// ── Filesystem implementation ──

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, container: &str) -> Self {
        Self {
            root: root.into().join(container),
        }
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        // Keys are server-composed, but reject separator tricks anyway.
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            anyhow::bail!("invalid blob key: {key}");
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix.trim_end_matches('/'))?
        };

        let mut keys = Vec::new();
        let mut pending: Vec<PathBuf> = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = relative_key(&self.root, &path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
}

// ── In-memory implementation (tests) ──

#[cfg(test)]
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        self.blobs
            .lock()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.blobs.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trips_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "test-results");

        let job = uuid::Uuid::new_v4();
        let key = artifact_key("acme", "pay", &job, "test-results.xml");
        store.put(&key, b"<tests/>").await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(b"<tests/>".to_vec()));
        assert_eq!(
            store.list(&format!("acme/pay/{job}")).await.unwrap(),
            vec![key.clone()]
        );

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        // Deleting again is a no-op.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "c");
        assert!(store.put("../escape", b"x").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_lists_by_prefix() {
        let store = MemoryBlobStore::new();
        store.put("a/1", b"1").await.unwrap();
        store.put("a/2", b"2").await.unwrap();
        store.put("b/1", b"3").await.unwrap();

        assert_eq!(store.list("a/").await.unwrap(), vec!["a/1", "a/2"]);
    }
}
