//! In-process blob store. Used by tests and by single-process deployments
//! that do not need blobs to outlive the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{BlobSink, WriteBudget};
use crate::{
    BlobConfig, BlobError, BlobRef, BlobResult, BlobStore, BlobTxn, ByteStream, PutResult,
    StoreCapabilities, TxnId,
};

#[derive(Default)]
struct MemoryState {
    blobs: HashMap<BlobRef, Bytes>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    state: Arc<Mutex<MemoryState>>,
    config: BlobConfig,
}

impl MemoryBlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            config,
        }
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.state.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, blob: &BlobRef) -> bool {
        self.state.lock().blobs.contains_key(blob)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn begin(&self) -> BlobResult<Box<dyn BlobTxn>> {
        let txn = MemoryTxn {
            id: TxnId::new(),
            state: self.state.clone(),
            config: self.config.clone(),
            staged: HashMap::new(),
            deleted: HashSet::new(),
            aborted: false,
        };
        debug!(txn = %txn.id, "memory blob txn opened");
        Ok(Box::new(txn))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic("memory")
    }
}

/// Writes and deletes live only in the transaction until commit.
struct MemoryTxn {
    id: TxnId,
    state: Arc<Mutex<MemoryState>>,
    config: BlobConfig,
    staged: HashMap<BlobRef, Bytes>,
    deleted: HashSet<BlobRef>,
    aborted: bool,
}

impl MemoryTxn {
    fn ensure_open(&self) -> BlobResult<()> {
        if self.aborted {
            return Err(BlobError::closed(self.id.as_str(), "aborted by a failed write"));
        }
        Ok(())
    }

    fn allocate(&self) -> BlobRef {
        let mut state = self.state.lock();
        state.next_id += 1;
        BlobRef(format!("mem-{}", state.next_id))
    }

    fn visible(&self, blob: &BlobRef) -> Option<Bytes> {
        if let Some(data) = self.staged.get(blob) {
            return Some(data.clone());
        }
        if self.deleted.contains(blob) {
            return None;
        }
        self.state.lock().blobs.get(blob).cloned()
    }
}

#[async_trait]
impl BlobTxn for MemoryTxn {
    fn id(&self) -> &TxnId {
        &self.id
    }

    async fn write(&mut self, mut stream: ByteStream) -> BlobResult<PutResult> {
        self.ensure_open()?;
        let mut budget = WriteBudget::new(self.config.max_blob_bytes);
        let mut buf = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.aborted = true;
                    return Err(err.into());
                }
            };
            if let Err(err) = budget.admit(chunk.len()) {
                self.aborted = true;
                return Err(err);
            }
            for piece in chunk.chunks(self.config.chunk_size) {
                buf.extend_from_slice(piece);
            }
        }

        let blob_ref = self.allocate();
        self.staged.insert(blob_ref.clone(), buf.freeze());
        Ok(PutResult {
            blob_ref,
            bytes_written: budget.written(),
        })
    }

    async fn read(&mut self, blob: &BlobRef, sink: &mut BlobSink<'_>) -> BlobResult<u64> {
        self.ensure_open()?;
        let data = self
            .visible(blob)
            .ok_or_else(|| BlobError::not_found(blob.as_str()))?;

        for piece in data.chunks(self.config.chunk_size) {
            sink.write_all(piece).await?;
        }
        sink.flush().await?;
        Ok(data.len() as u64)
    }

    async fn delete(&mut self, blob: &BlobRef) -> BlobResult<()> {
        self.ensure_open()?;
        if self.staged.remove(blob).is_some() {
            return Ok(());
        }
        if self.visible(blob).is_none() {
            return Err(BlobError::not_found(blob.as_str()));
        }
        self.deleted.insert(blob.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BlobResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        for blob in &self.deleted {
            state.blobs.remove(blob);
        }
        for (blob, data) in &self.staged {
            state.blobs.insert(blob.clone(), data.clone());
        }
        debug!(txn = %self.id, written = self.staged.len(), deleted = self.deleted.len(), "memory blob txn committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BlobResult<()> {
        debug!(txn = %self.id, "memory blob txn rolled back");
        Ok(())
    }
}
