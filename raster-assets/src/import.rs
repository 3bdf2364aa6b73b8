use std::sync::Arc;

use raster_blob::{BlobStore, BlobTxn, ByteStream};
use raster_core::{RasterError, RasterResult};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::errors::{blob_failure, BlobResultExt};
use crate::events::{AssetEvent, AssetEvents};
use crate::{AssetRecord, AssetRegistry, AssetType, NewAsset};

/// Metadata accompanying an upload.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Original filename; decides the asset type.
    pub name: String,
    /// Length the client announced; checked against what was stored.
    pub declared_size: u64,
    pub description: Option<String>,
}

impl ImportRequest {
    pub fn new(name: impl Into<String>, declared_size: u64) -> Self {
        Self {
            name: name.into(),
            declared_size,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Stores an upload as a blob, records it, then announces it.
///
/// Ordering within one call: blob commit, then record creation, then the
/// `Imported` notification. A subscriber therefore always finds both.
#[derive(Clone)]
pub struct ImportPipeline {
    registry: Arc<dyn AssetRegistry>,
    blobs: Arc<dyn BlobStore>,
    events: Arc<AssetEvents>,
}

async fn abandon(txn: Box<dyn BlobTxn>) {
    if let Err(err) = txn.rollback().await {
        warn!(error = %err, "blob rollback failed; uncommitted data is discarded with the transaction");
    }
}

impl ImportPipeline {
    pub fn new(registry: Arc<dyn AssetRegistry>, blobs: Arc<dyn BlobStore>, events: Arc<AssetEvents>) -> Self {
        Self {
            registry,
            blobs,
            events,
        }
    }

    #[instrument(skip(self, request, stream), fields(name = %request.name, declared = request.declared_size))]
    pub async fn import(&self, request: ImportRequest, stream: ByteStream) -> RasterResult<AssetRecord> {
        if request.name.trim().is_empty() {
            return Err(RasterError::invalid_input("file name must not be empty"));
        }

        let mut txn = self.blobs.begin().await.or_io_failure("opening import transaction")?;
        let put = match txn.write(stream).await {
            Ok(put) => put,
            Err(err) => {
                abandon(txn).await;
                return Err(blob_failure(err, "storing upload"));
            }
        };

        if put.bytes_written != request.declared_size {
            abandon(txn).await;
            warn!(written = put.bytes_written, "upload length does not match declared size");
            return Err(RasterError::integrity_mismatch(format!(
                "declared {} bytes but received {}",
                request.declared_size, put.bytes_written
            ))
            .with_data(json!({
                "declared": request.declared_size,
                "written": put.bytes_written,
            })));
        }

        txn.commit().await.or_io_failure("committing upload")?;

        let new_asset = NewAsset {
            asset_type: AssetType::from_filename(&request.name),
            name: request.name,
            description: request.description.filter(|d| !d.trim().is_empty()),
            byte_size: put.bytes_written,
            blob_ref: put.blob_ref.clone(),
        };
        let record = match self.registry.create(new_asset).await {
            Ok(record) => record,
            Err(err) => {
                // The blob is committed but nothing references it.
                error!(blob_ref = %put.blob_ref, error = %err, "record creation failed, blob orphaned");
                return Err(err);
            }
        };
        info!(asset_id = %record.id, blob_ref = %put.blob_ref, asset_type = record.asset_type.as_str(), "raster imported");

        let delivery = self.events.publish(AssetEvent::Imported(record.id)).await;
        if delivery.failed > 0 {
            warn!(asset_id = %record.id, failed = delivery.failed, "imported listeners failed");
        }
        Ok(record)
    }
}
