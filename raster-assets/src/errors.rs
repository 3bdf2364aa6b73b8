use raster_blob::{BlobError, BlobResult};
use raster_core::RasterError;

use crate::AssetId;

/// Translate blob-layer failures into the vault taxonomy.
///
/// A size-limit breach is the caller's fault; everything else is an
/// I/O failure of the storage engine.
pub(crate) fn blob_failure(err: BlobError, action: &str) -> RasterError {
    match err {
        BlobError::TooLarge { limit } => {
            RasterError::invalid_input(format!("{action}: upload exceeds the {limit} byte limit"))
        }
        other => RasterError::io_failure(format!("{action}: {other}")).with_source(other),
    }
}

pub(crate) trait BlobResultExt<T> {
    fn or_io_failure(self, action: &str) -> Result<T, RasterError>;
}

impl<T> BlobResultExt<T> for BlobResult<T> {
    fn or_io_failure(self, action: &str) -> Result<T, RasterError> {
        self.map_err(|err| blob_failure(err, action))
    }
}

pub(crate) fn asset_not_found(id: AssetId) -> RasterError {
    RasterError::not_found(format!("no raster asset with id {id}"))
}

pub(crate) fn blob_missing(id: AssetId) -> RasterError {
    RasterError::missing_blob(format!("raster asset {id} has no stored blob"))
}
