use std::path::{Path, PathBuf};
use std::sync::Arc;

use raster_blob::{BlobRef, BlobSink, BlobStore};
use raster_core::RasterResult;
use tracing::{debug, info, instrument, warn};

use crate::errors::{asset_not_found, blob_failure, blob_missing, BlobResultExt};
use crate::{AssetId, AssetRecord, AssetRegistry};

/// Streams stored blobs back out to files or arbitrary sinks.
#[derive(Clone)]
pub struct ExportPipeline {
    registry: Arc<dyn AssetRegistry>,
    blobs: Arc<dyn BlobStore>,
}

impl ExportPipeline {
    pub fn new(registry: Arc<dyn AssetRegistry>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { registry, blobs }
    }

    /// Record plus its blob reference; `NotFound` / `MissingBlob` otherwise.
    pub(crate) async fn resolve(&self, id: AssetId) -> RasterResult<(AssetRecord, BlobRef)> {
        let record = self
            .registry
            .get(id)
            .await?
            .ok_or_else(|| asset_not_found(id))?;
        let blob_ref = record.blob_ref.clone().ok_or_else(|| blob_missing(id))?;
        Ok((record, blob_ref))
    }

    /// Write the content of asset `id` to `dest`, replacing any existing
    /// file. On failure the partial file is removed.
    #[instrument(skip(self, dest), fields(asset_id = %id, dest = %dest.display()))]
    pub async fn export(&self, id: AssetId, dest: &Path) -> RasterResult<PathBuf> {
        let (record, _) = self.resolve(id).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let result = self.export_to(&record, &mut file).await;
        drop(file);

        match result {
            Ok(bytes) => {
                info!(bytes, "asset exported");
                Ok(dest.to_path_buf())
            }
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                    debug!(error = %cleanup, "could not remove partial export");
                }
                Err(err)
            }
        }
    }

    /// Stream the blob of `record` into `sink` inside one blob transaction.
    #[instrument(skip(self, record, sink), fields(asset_id = %record.id))]
    pub async fn export_to(&self, record: &AssetRecord, sink: &mut BlobSink<'_>) -> RasterResult<u64> {
        let blob_ref = record.blob_ref.as_ref().ok_or_else(|| blob_missing(record.id))?;

        let mut txn = self.blobs.begin().await.or_io_failure("opening export transaction")?;
        let copied = match txn.read(blob_ref, sink).await {
            Ok(copied) => copied,
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "rollback after failed export failed");
                }
                return Err(blob_failure(err, "reading blob"));
            }
        };
        txn.commit().await.or_io_failure("committing export transaction")?;

        if copied != record.byte_size {
            warn!(
                blob_ref = %blob_ref,
                expected = record.byte_size,
                copied,
                "exported byte count differs from the recorded size"
            );
        }
        Ok(copied)
    }
}
