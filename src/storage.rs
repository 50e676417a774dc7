use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::RwLock;

/// String-keyed persistent storage, the server-side stand-in for browser
/// local storage. Values are opaque strings (callers store JSON).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

fn check_key(key: &str) -> anyhow::Result<()> {
    lazy_static! {
        static ref KEY_RE: Regex = Regex::new(r"^[A-Za-z0-9_\-]{1,128}$").unwrap();
    }
    anyhow::ensure!(KEY_RE.is_match(key), "invalid storage key {:?}", key);
    Ok(())
}

/// One file per key under `root`. Writes go through a temp file and a rename
/// so readers never observe a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create data dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        // unique per write so concurrent sets on one key never share a temp file
        let tmp = self.root.join(format!("{key}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

/// Volatile store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        check_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        check_key(key)?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        check_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("nutrivision-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn file_store_concurrent_sets_on_one_key() {
        let dir = scratch_dir();
        let store = std::sync::Arc::new(FileStore::open(&dir).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set("user", &format!("{{\"n\":{i}}}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let last = store.get("user").await.unwrap().unwrap();
        assert!(last.starts_with("{\"n\":"));
        let mut names = tokio::fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = names.next_entry().await.unwrap() {
            assert!(!entry.file_name().to_string_lossy().ends_with(".tmp"));
        }
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn file_store_set_get_remove() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).await.unwrap();

        assert_eq!(store.get("nutrivision_db").await.unwrap(), None);
        store.set("nutrivision_db", r#"{"meals":[]}"#).await.unwrap();
        assert_eq!(
            store.get("nutrivision_db").await.unwrap().as_deref(),
            Some(r#"{"meals":[]}"#)
        );

        store.set("nutrivision_db", "{}").await.unwrap();
        assert_eq!(store.get("nutrivision_db").await.unwrap().as_deref(), Some("{}"));

        store.remove("nutrivision_db").await.unwrap();
        assert_eq!(store.get("nutrivision_db").await.unwrap(), None);
        // removing twice is fine
        store.remove("nutrivision_db").await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).await.unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.set("a/b", "x").await.is_err());
        assert!(store.remove("").await.is_err());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_behaves_like_a_map() {
        let store = MemoryStore::new();
        store.set("user", "alice").await.unwrap();
        assert_eq!(store.get("user").await.unwrap().as_deref(), Some("alice"));
        store.remove("user").await.unwrap();
        assert_eq!(store.get("user").await.unwrap(), None);
    }
}
