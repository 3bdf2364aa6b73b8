//! # raster-assets: the raster asset vault
//!
//! Imports large raster files as transactional blobs, tracks one
//! [`AssetRecord`] per file, streams content back out, and derives a JPEG
//! thumbnail through an external render tool.
//!
//! ```text
//! upload ─▶ ImportPipeline ─▶ BlobStore (commit) ─▶ AssetRegistry (create)
//!                                  │
//!                                  └─▶ EventHub ─▶ ThumbnailPipeline
//!                                                   ├─ export to temp
//!                                                   ├─ render tool
//!                                                   └─ AssetRegistry (patch)
//! ```
//!
//! [`RasterVault`] bundles the pipelines behind the operations an HTTP
//! layer needs.

mod config;
mod errors;
mod events;
mod export;
mod import;
mod locks;
#[cfg(feature = "postgres")]
mod pg_registry;
mod record;
mod registry;
mod render;
mod thumbnail;
mod vault;

pub use config::{DeletePolicy, VaultConfig, DEFAULT_RENDER_TIMEOUT};
pub use events::{AssetEvent, AssetEvents};
pub use export::ExportPipeline;
pub use import::{ImportPipeline, ImportRequest};
pub use locks::{KeyGuard, KeyedLocks};
#[cfg(feature = "postgres")]
pub use pg_registry::PgAssetRegistry;
pub use record::{format_size, AssetId, AssetPatch, AssetRecord, AssetSize, AssetType, NewAsset};
pub use registry::{AssetRegistry, MemoryAssetRegistry};
pub use render::{ProcessOutput, ProcessRunner, RenderTool, TokioProcessRunner};
pub use thumbnail::{ThumbnailPipeline, THUMBNAIL_CONTENT_TYPE};
pub use vault::{RasterVault, Thumbnail};
