//! Filesystem blob store.
//!
//! Layout under `root`:
//!
//! ```text
//! root/<blob_ref>                  committed blobs
//! root/.staging/<txn>/<blob_ref>   writes of an open transaction
//! ```
//!
//! Commit renames staged files into place, so a reader never observes a
//! partially written blob.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{pump, BlobSink, WriteBudget};
use crate::{
    BlobConfig, BlobError, BlobRef, BlobResult, BlobStore, BlobTxn, ByteStream, PutResult,
    StoreCapabilities, TxnId,
};

const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    config: BlobConfig,
}

impl FsBlobStore {
    /// Create the store, making `root` if needed.
    pub async fn open(root: impl Into<PathBuf>, config: BlobConfig) -> BlobResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(STAGING_DIR)).await?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn begin(&self) -> BlobResult<Box<dyn BlobTxn>> {
        let id = TxnId::new();
        let staging = self.root.join(STAGING_DIR).join(id.as_str());
        tokio::fs::create_dir_all(&staging).await?;
        debug!(txn = %id, "fs blob txn opened");
        Ok(Box::new(FsTxn {
            id,
            root: self.root.clone(),
            staging,
            config: self.config.clone(),
            staged: HashSet::new(),
            deleted: HashSet::new(),
            aborted: false,
            finished: false,
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic("filesystem").durable()
    }
}

struct FsTxn {
    id: TxnId,
    root: PathBuf,
    staging: PathBuf,
    config: BlobConfig,
    staged: HashSet<BlobRef>,
    deleted: HashSet<BlobRef>,
    aborted: bool,
    finished: bool,
}

/// Blob refs become file names; reject anything that could escape `root`.
fn checked(blob: &BlobRef) -> BlobResult<&str> {
    let name = blob.as_str();
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(BlobError::invalid(format!("malformed blob reference '{name}'")))
    }
}

impl FsTxn {
    fn ensure_open(&self) -> BlobResult<()> {
        if self.aborted {
            return Err(BlobError::closed(self.id.as_str(), "aborted by a failed write"));
        }
        Ok(())
    }

    /// Where `blob` currently lives from this transaction's point of view.
    async fn locate(&self, blob: &BlobRef) -> BlobResult<Option<PathBuf>> {
        let name = checked(blob)?;
        if self.staged.contains(blob) {
            return Ok(Some(self.staging.join(name)));
        }
        if self.deleted.contains(blob) {
            return Ok(None);
        }
        let path = self.root.join(name);
        if tokio::fs::try_exists(&path).await? {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    async fn write_file(&mut self, path: &Path, mut stream: ByteStream) -> BlobResult<u64> {
        let mut budget = WriteBudget::new(self.config.max_blob_bytes);
        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            budget.admit(chunk.len())?;
            for piece in chunk.chunks(self.config.chunk_size) {
                file.write_all(piece).await?;
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(budget.written())
    }

    async fn discard_staging(&mut self) {
        self.finished = true;
        if let Err(err) = tokio::fs::remove_dir_all(&self.staging).await {
            warn!(txn = %self.id, error = %err, "failed to remove staging dir");
        }
    }
}

#[async_trait]
impl BlobTxn for FsTxn {
    fn id(&self) -> &TxnId {
        &self.id
    }

    async fn write(&mut self, stream: ByteStream) -> BlobResult<PutResult> {
        self.ensure_open()?;
        let blob_ref = BlobRef(Uuid::new_v4().simple().to_string());
        let path = self.staging.join(blob_ref.as_str());

        match self.write_file(&path, stream).await {
            Ok(bytes_written) => {
                self.staged.insert(blob_ref.clone());
                Ok(PutResult {
                    blob_ref,
                    bytes_written,
                })
            }
            Err(err) => {
                self.aborted = true;
                let _ = tokio::fs::remove_file(&path).await;
                Err(err)
            }
        }
    }

    async fn read(&mut self, blob: &BlobRef, sink: &mut BlobSink<'_>) -> BlobResult<u64> {
        self.ensure_open()?;
        let path = self
            .locate(blob)
            .await?
            .ok_or_else(|| BlobError::not_found(blob.as_str()))?;
        let mut file = tokio::fs::File::open(&path).await?;
        pump(&mut file, sink, self.config.chunk_size).await
    }

    async fn delete(&mut self, blob: &BlobRef) -> BlobResult<()> {
        self.ensure_open()?;
        if self.staged.remove(blob) {
            tokio::fs::remove_file(self.staging.join(checked(blob)?)).await?;
            return Ok(());
        }
        if self.locate(blob).await?.is_none() {
            return Err(BlobError::not_found(blob.as_str()));
        }
        self.deleted.insert(blob.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> BlobResult<()> {
        if self.aborted {
            self.discard_staging().await;
            return Err(BlobError::closed(self.id.as_str(), "aborted by a failed write"));
        }

        for blob in &self.staged {
            let name = checked(blob)?;
            tokio::fs::rename(self.staging.join(name), self.root.join(name)).await?;
        }
        for blob in &self.deleted {
            match tokio::fs::remove_file(self.root.join(checked(blob)?)).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(txn = %self.id, written = self.staged.len(), deleted = self.deleted.len(), "fs blob txn committed");
        self.discard_staging().await;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> BlobResult<()> {
        self.discard_staging().await;
        debug!(txn = %self.id, "fs blob txn rolled back");
        Ok(())
    }
}

impl Drop for FsTxn {
    fn drop(&mut self) {
        if !self.finished {
            let _ = std::fs::remove_dir_all(&self.staging);
        }
    }
}
