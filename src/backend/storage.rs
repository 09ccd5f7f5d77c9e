//! Key/value storage for configuration and role records.
//!
//! Values are opaque bytes (JSON in practice). Keys are `/`-separated paths;
//! `list(prefix)` returns the immediate children below `prefix`, with a
//! trailing `/` on children that are themselves prefixes.

use crate::{Error, Result};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

fn child_of(prefix: &str, key: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    Some(match rest.find('/') {
        Some(i) => rest[..=i].to_string(),
        None => rest.to_string(),
    })
}

/// In-memory storage. Data is lost on restart.
#[derive(Debug, Default)]
pub struct InmemStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InmemStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InmemStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let children: BTreeSet<String> = entries
            .keys()
            .filter_map(|key| child_of(prefix, key))
            .collect();
        Ok(children.into_iter().collect())
    }
}

/// One file per key below a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_end_matches('/'));
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

fn storage_error(op: &str, path: &Path, err: &std::io::Error) -> Error {
    Error::Storage(format!("{op} {}: {err}", path.display()))
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, &e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create", parent, &e))?;
        }

        // Write next to the target and rename so readers never see a partial record.
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::Storage(format!("invalid storage key: {key:?}")))?;
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| storage_error("write", &tmp, &e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error("rename", &path, &e))?;

        debug!("stored {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("delete", &path, &e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.path_for(prefix)?
        };

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("list", &dir, &e)),
        };

        let mut children = BTreeSet::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| storage_error("list", &dir, &e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| storage_error("list", &entry.path(), &e))?
                .is_dir();
            children.insert(if is_dir { format!("{name}/") } else { name });
        }

        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn exercise(storage: &dyn Storage) {
        assert!(storage.get("config").await.unwrap().is_none());

        storage.put("config", b"{}".to_vec()).await.unwrap();
        storage.put("role/b", b"2".to_vec()).await.unwrap();
        storage.put("role/a", b"1".to_vec()).await.unwrap();
        storage.put("role/nested/c", b"3".to_vec()).await.unwrap();

        assert_eq!(storage.get("config").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(
            storage.list("role/").await.unwrap(),
            vec!["a".to_string(), "b".to_string(), "nested/".to_string()]
        );

        storage.delete("role/a").await.unwrap();
        storage.delete("role/a").await.unwrap();
        assert!(storage.get("role/a").await.unwrap().is_none());
        assert_eq!(
            storage.list("role/").await.unwrap(),
            vec!["b".to_string(), "nested/".to_string()]
        );
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inmem_storage_round_trips() {
        exercise(&InmemStorage::new()).await;
    }

    #[tokio::test]
    async fn file_storage_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileStorage::new(dir.path())).await;
    }

    #[tokio::test]
    async fn file_storage_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.get("../etc/passwd").await.is_err());
        assert!(storage.put("/abs", Vec::new()).await.is_err());
        assert!(storage.get("").await.is_err());
    }
}
