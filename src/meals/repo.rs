use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::meals::repo_types::StoreDocument;
use crate::storage::KeyValueStore;

pub const STORE_KEY: &str = "nutrivision_db";

/// Accessor for the single persisted document.
///
/// Reads never fail: an absent document is replaced by the default one, a
/// corrupt or unreadable one is substituted by the default in memory and
/// counted in [`MealStore::degraded_reads`]. Mutations go through
/// [`MealStore::update`], which holds `write_lock` across the whole
/// read-modify-write so concurrent callers cannot drop each other's changes.
pub struct MealStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Mutex<()>,
    degraded_reads: AtomicU64,
}

impl MealStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(kv, STORE_KEY)
    }

    pub fn with_key(kv: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self {
            kv,
            key: key.to_string(),
            write_lock: Mutex::new(()),
            degraded_reads: AtomicU64::new(0),
        }
    }

    pub fn degraded_reads(&self) -> u64 {
        self.degraded_reads.load(Ordering::Relaxed)
    }

    pub async fn read(&self) -> StoreDocument {
        match self.kv.get(&self.key).await {
            Ok(Some(raw)) => self.parse(&raw),
            Ok(None) => self.install_default().await,
            Err(e) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, key = %self.key, "store read failed; using default document");
                StoreDocument::default()
            }
        }
    }

    /// Byte length of the persisted document, 0 when absent or unreadable.
    pub async fn size_bytes(&self) -> usize {
        match self.kv.get(&self.key).await {
            Ok(Some(raw)) => raw.len(),
            _ => 0,
        }
    }

    pub async fn update<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut StoreDocument) -> T,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = match self
            .kv
            .get(&self.key)
            .await
            .with_context(|| format!("read {}", self.key))?
        {
            // writes refuse to clobber a document they cannot parse
            Some(raw) => serde_json::from_str::<StoreDocument>(&raw)
                .with_context(|| format!("parse {}", self.key))?,
            None => StoreDocument::default(),
        };
        let out = f(&mut doc);
        let raw = serde_json::to_string(&doc).context("serialize store document")?;
        self.kv
            .set(&self.key, &raw)
            .await
            .with_context(|| format!("write {}", self.key))?;
        debug!(key = %self.key, bytes = raw.len(), meals = doc.meals.len(), "store written");
        Ok(out)
    }

    /// Deletes the document outright; the next read reinstalls the default.
    pub async fn remove(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .remove(&self.key)
            .await
            .with_context(|| format!("remove {}", self.key))
    }

    fn parse(&self, raw: &str) -> StoreDocument {
        match serde_json::from_str::<StoreDocument>(raw) {
            Ok(doc) => doc,
            Err(e) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, key = %self.key, "store document is corrupt; using default document");
                StoreDocument::default()
            }
        }
    }

    async fn install_default(&self) -> StoreDocument {
        let _guard = self.write_lock.lock().await;
        // another caller may have written while we waited
        if let Ok(Some(raw)) = self.kv.get(&self.key).await {
            return self.parse(&raw);
        }
        let doc = StoreDocument::default();
        match serde_json::to_string(&doc) {
            Ok(raw) => {
                if let Err(e) = self.kv.set(&self.key, &raw).await {
                    warn!(error = %e, key = %self.key, "could not install default document");
                }
            }
            Err(e) => warn!(error = %e, "serialize default document"),
        }
        doc
    }
}
