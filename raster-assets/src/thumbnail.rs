use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use raster_core::{EventKind, ListenerId, RasterError, RasterResult};
use tracing::{debug, error, info, instrument, warn};

use crate::events::{AssetEvent, AssetEvents};
use crate::export::ExportPipeline;
use crate::locks::KeyedLocks;
use crate::render::RenderTool;
use crate::{AssetId, AssetPatch, AssetRecord, AssetRegistry};

/// Content type of stored thumbnails.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Temp file pair for one asset. Both files are removed when the guard
/// drops, whatever path the generation took.
struct TempFiles {
    input: PathBuf,
    output: PathBuf,
}

fn temp_paths_in(dir: &Path, id: AssetId) -> (PathBuf, PathBuf) {
    let input = dir.join(format!("raster_{id}.tif"));
    let output = dir.join(format!("raster_{id}.tif.thumbnail.jpg"));
    (input, output)
}

impl TempFiles {
    fn for_asset(dir: &Path, id: AssetId) -> Self {
        let (input, output) = temp_paths_in(dir, id);
        Self { input, output }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove thumbnail temp file"),
            }
        }
    }
}

/// Derives a JPEG preview for an asset through the external render tool
/// and stores it on the record.
///
/// Generations for the same id run one at a time since they share temp
/// paths; different ids proceed in parallel.
#[derive(Clone)]
pub struct ThumbnailPipeline {
    registry: Arc<dyn AssetRegistry>,
    export: ExportPipeline,
    render: RenderTool,
    temp_dir: PathBuf,
    locks: Arc<KeyedLocks<AssetId>>,
}

impl ThumbnailPipeline {
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        export: ExportPipeline,
        render: RenderTool,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            export,
            render,
            temp_dir: temp_dir.into(),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// `(input, output)` temp paths used for `id`.
    pub fn temp_paths(&self, id: AssetId) -> (PathBuf, PathBuf) {
        temp_paths_in(&self.temp_dir, id)
    }

    /// Export, render and store the thumbnail of asset `id`, replacing any
    /// previous one. Returns the updated record.
    #[instrument(skip(self), fields(asset_id = %id))]
    pub async fn generate_and_store(&self, id: AssetId) -> RasterResult<AssetRecord> {
        let _turn = self.locks.lock(id).await;
        let (record, _) = self.export.resolve(id).await?;

        let files = TempFiles::for_asset(&self.temp_dir, id);
        debug!(input = %files.input.display(), "exporting raster for rendering");

        let mut sink = tokio::fs::File::create(&files.input).await?;
        self.export.export_to(&record, &mut sink).await?;
        sink.sync_all().await?;
        drop(sink);

        let exported = tokio::fs::metadata(&files.input).await?.len();
        if exported == 0 {
            return Err(RasterError::io_failure(format!(
                "exported raster for asset {id} is empty"
            )));
        }

        self.render.render(&files.input, &files.output).await?;

        let thumbnail = tokio::fs::read(&files.output).await?;
        let size = thumbnail.len();
        let updated = self
            .registry
            .patch(id, AssetPatch::new().with_thumbnail(thumbnail))
            .await?;
        info!(bytes = size, "thumbnail stored");
        Ok(updated)
    }

    /// Generate a thumbnail for every imported asset and announce it as
    /// [`AssetEvent::Updated`]. Failures are logged here and never reach
    /// the importer.
    pub fn subscribe(&self, hub: &Arc<AssetEvents>) -> ListenerId {
        let pipeline = self.clone();
        let weak = Arc::downgrade(hub);
        hub.on(
            EventKind::Imported,
            Arc::new(move |event: AssetEvent| {
                let pipeline = pipeline.clone();
                let weak = weak.clone();
                async move {
                    let id = event.asset_id();
                    match pipeline.generate_and_store(id).await {
                        Ok(_) => {
                            if let Some(hub) = weak.upgrade() {
                                let _ = hub.publish(AssetEvent::Updated(id)).await;
                            }
                        }
                        Err(err) => error!(
                            asset_id = %id,
                            kind = err.name(),
                            error = %err,
                            data = ?err.data,
                            "thumbnail generation after import failed"
                        ),
                    }
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
        )
    }
}
