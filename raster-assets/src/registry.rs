use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use raster_core::RasterResult;

use crate::errors::asset_not_found;
use crate::{AssetId, AssetPatch, AssetRecord, NewAsset};

/// Durable store of [`AssetRecord`]s.
///
/// Implementations handle their own concurrency; concurrent patches of the
/// same id are last-write-wins.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Persist a new record and assign its id.
    async fn create(&self, data: NewAsset) -> RasterResult<AssetRecord>;

    /// Single record by id, `None` when absent.
    async fn get(&self, id: AssetId) -> RasterResult<Option<AssetRecord>>;

    /// All records ordered by id.
    async fn find(&self) -> RasterResult<Vec<AssetRecord>>;

    /// Apply a partial update, refreshing `updated_at`. `NotFound` when absent.
    async fn patch(&self, id: AssetId, patch: AssetPatch) -> RasterResult<AssetRecord>;

    /// Delete and return the record. `NotFound` when absent.
    async fn remove(&self, id: AssetId) -> RasterResult<AssetRecord>;
}

/// Process-local registry backed by a `BTreeMap`.
#[derive(Default)]
pub struct MemoryAssetRegistry {
    records: RwLock<BTreeMap<AssetId, AssetRecord>>,
    last_id: AtomicI64,
}

impl MemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetRegistry for MemoryAssetRegistry {
    async fn create(&self, data: NewAsset) -> RasterResult<AssetRecord> {
        let id = AssetId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = data.into_record(id, Utc::now());
        self.records.write().insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: AssetId) -> RasterResult<Option<AssetRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find(&self) -> RasterResult<Vec<AssetRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn patch(&self, id: AssetId, patch: AssetPatch) -> RasterResult<AssetRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or_else(|| asset_not_found(id))?;
        patch.apply(record, Utc::now());
        Ok(record.clone())
    }

    async fn remove(&self, id: AssetId) -> RasterResult<AssetRecord> {
        self.records
            .write()
            .remove(&id)
            .ok_or_else(|| asset_not_found(id))
    }
}
