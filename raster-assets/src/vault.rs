use std::path::{Path, PathBuf};
use std::sync::Arc;

use raster_blob::{BlobRef, BlobStore, ByteStream, MemoryBlobStore};
use raster_core::{ListenerId, RasterError, RasterResult};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{DeletePolicy, VaultConfig};
use crate::errors::{asset_not_found, blob_failure, BlobResultExt};
use crate::events::{AssetEvent, AssetEvents};
use crate::export::ExportPipeline;
use crate::import::{ImportPipeline, ImportRequest};
use crate::registry::MemoryAssetRegistry;
use crate::render::{ProcessRunner, RenderTool, TokioProcessRunner};
use crate::thumbnail::{ThumbnailPipeline, THUMBNAIL_CONTENT_TYPE};
use crate::{AssetId, AssetPatch, AssetRecord, AssetRegistry, AssetSize};

/// Stored preview of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// The operations an HTTP layer exposes, wired together.
///
/// ```rust,no_run
/// use raster_assets::{ImportRequest, RasterVault, VaultConfig};
/// use raster_blob::bytes_stream;
///
/// # async fn run() -> raster_core::RasterResult<()> {
/// let vault = RasterVault::in_memory(VaultConfig::default());
/// let data = std::fs::read("scan.tif")?;
/// let record = vault
///     .import(ImportRequest::new("scan.tif", data.len() as u64), bytes_stream(data, 4096))
///     .await?;
/// vault.export(record.id, "/tmp/scan-copy.tif").await?;
/// # Ok(())
/// # }
/// ```
pub struct RasterVault {
    config: VaultConfig,
    registry: Arc<dyn AssetRegistry>,
    blobs: Arc<dyn BlobStore>,
    events: Arc<AssetEvents>,
    importer: ImportPipeline,
    exporter: ExportPipeline,
    thumbnails: ThumbnailPipeline,
    thumbnail_listener: Option<ListenerId>,
}

impl RasterVault {
    pub fn new(
        config: VaultConfig,
        registry: Arc<dyn AssetRegistry>,
        blobs: Arc<dyn BlobStore>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let events = Arc::new(AssetEvents::new(config.dispatch));
        let importer = ImportPipeline::new(registry.clone(), blobs.clone(), events.clone());
        let exporter = ExportPipeline::new(registry.clone(), blobs.clone());
        let thumbnails = ThumbnailPipeline::new(
            registry.clone(),
            exporter.clone(),
            RenderTool::from_config(&config, runner),
            config.temp_dir.clone(),
        );
        let thumbnail_listener = config
            .thumbnail_on_import
            .then(|| thumbnails.subscribe(&events));

        let caps = blobs.capabilities();
        debug!(
            backend = caps.backend,
            durable = caps.durable,
            dispatch = ?config.dispatch,
            thumbnail_on_import = config.thumbnail_on_import,
            "raster vault ready"
        );

        Self {
            config,
            registry,
            blobs,
            events,
            importer,
            exporter,
            thumbnails,
            thumbnail_listener,
        }
    }

    /// Memory registry and blob store, real render processes.
    pub fn in_memory(config: VaultConfig) -> Self {
        let blobs = MemoryBlobStore::new(config.blob.clone());
        Self::new(
            config,
            Arc::new(MemoryAssetRegistry::new()),
            Arc::new(blobs),
            Arc::new(TokioProcessRunner),
        )
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<AssetEvents> {
        &self.events
    }

    pub fn thumbnails(&self) -> &ThumbnailPipeline {
        &self.thumbnails
    }

    /// Stop generating thumbnails on import. Returns whether a
    /// subscription was active.
    pub fn detach_thumbnails(&mut self) -> bool {
        match self.thumbnail_listener.take() {
            Some(id) => self.events.off(id),
            None => false,
        }
    }

    pub async fn import(&self, request: ImportRequest, stream: ByteStream) -> RasterResult<AssetRecord> {
        self.importer.import(request, stream).await
    }

    pub async fn export(&self, id: AssetId, dest: impl AsRef<Path>) -> RasterResult<PathBuf> {
        self.exporter.export(id, dest.as_ref()).await
    }

    pub async fn get(&self, id: AssetId) -> RasterResult<AssetRecord> {
        self.registry.get(id).await?.ok_or_else(|| asset_not_found(id))
    }

    /// All assets ordered by id.
    pub async fn list(&self) -> RasterResult<Vec<AssetRecord>> {
        self.registry.find().await
    }

    pub async fn description(&self, id: AssetId) -> RasterResult<Option<String>> {
        Ok(self.get(id).await?.description)
    }

    pub async fn size(&self, id: AssetId) -> RasterResult<AssetSize> {
        Ok(AssetSize::of(&self.get(id).await?))
    }

    /// `NotFound` when the asset or its thumbnail does not exist.
    pub async fn thumbnail(&self, id: AssetId) -> RasterResult<Thumbnail> {
        match self.get(id).await?.thumbnail {
            Some(bytes) if !bytes.is_empty() => Ok(Thumbnail {
                bytes,
                content_type: THUMBNAIL_CONTENT_TYPE,
            }),
            _ => Err(RasterError::not_found(format!("raster asset {id} has no thumbnail"))),
        }
    }

    #[instrument(skip(self, description), fields(asset_id = %id))]
    pub async fn set_description(&self, id: AssetId, description: Option<String>) -> RasterResult<AssetRecord> {
        let record = self
            .registry
            .patch(id, AssetPatch::new().with_description(description))
            .await?;
        info!("description updated");
        let _ = self.events.publish(AssetEvent::Updated(id)).await;
        Ok(record)
    }

    /// Retriable entry point for thumbnails that failed after import.
    pub async fn generate_and_store(&self, id: AssetId) -> RasterResult<AssetRecord> {
        let record = self.thumbnails.generate_and_store(id).await?;
        let _ = self.events.publish(AssetEvent::Updated(id)).await;
        Ok(record)
    }

    /// Remove the record and its blob.
    ///
    /// With [`DeletePolicy::BestEffort`] a blob that cannot be deleted is
    /// logged and the record is removed anyway. With
    /// [`DeletePolicy::Strict`] the blob deletion is committed only after
    /// the record is gone, and a failure up to the record removal leaves
    /// both in place. If the final commit fails the record is already gone;
    /// the surviving blob is logged at `error` as orphaned.
    #[instrument(skip(self), fields(asset_id = %id))]
    pub async fn delete(&self, id: AssetId) -> RasterResult<()> {
        let record = self.get(id).await?;

        match (&record.blob_ref, self.config.delete_policy) {
            (None, _) => {
                self.registry.remove(id).await?;
            }
            (Some(blob_ref), DeletePolicy::BestEffort) => {
                if let Err(err) = self.delete_blob(blob_ref).await {
                    warn!(blob_ref = %blob_ref, error = %err, "blob delete failed, removing record anyway");
                }
                self.registry.remove(id).await?;
            }
            (Some(blob_ref), DeletePolicy::Strict) => {
                let mut txn = self.blobs.begin().await.or_io_failure("opening delete transaction")?;
                txn.delete(blob_ref).await.or_io_failure("deleting blob")?;
                self.registry.remove(id).await?;
                if let Err(err) = txn.commit().await {
                    error!(blob_ref = %blob_ref, error = %err, "blob delete did not commit after record removal, blob orphaned");
                    return Err(blob_failure(err, "committing blob delete"));
                }
            }
        }

        info!(blob_ref = ?record.blob_ref, "raster deleted");
        let _ = self.events.publish(AssetEvent::Removed(id)).await;
        Ok(())
    }

    async fn delete_blob(&self, blob_ref: &BlobRef) -> RasterResult<()> {
        let mut txn = self.blobs.begin().await.or_io_failure("opening delete transaction")?;
        txn.delete(blob_ref).await.or_io_failure("deleting blob")?;
        txn.commit().await.or_io_failure("committing blob delete")
    }
}
