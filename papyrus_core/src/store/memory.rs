use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ingest::models::StoreEntry;
use crate::ingest::traits::ContentStore;
use crate::Result;

/// In-memory content store for local development and unit tests.
///
/// Entries are keyed by their id; a `set` for an existing id replaces the
/// entry, matching the full-replace synchronization strategy.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    entries: Arc<Mutex<BTreeMap<String, StoreEntry>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all entries in id order (primarily for tests).
    pub async fn entries(&self) -> Vec<StoreEntry> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<StoreEntry> {
        self.entries.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn set(&self, entry: StoreEntry) -> Result<()> {
        self.entries.lock().await.insert(entry.id.clone(), entry);
        Ok(())
    }
}
