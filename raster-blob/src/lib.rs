//! # raster-blob: transactional, chunked blob storage
//!
//! `raster-blob` stores opaque binary payloads addressed by a [`BlobRef`].
//! Every operation runs inside an explicit transaction the caller opens
//! with [`BlobStore::begin`] and ends with `commit` or `rollback`. A
//! transaction dropped on an early return discards whatever it staged.
//!
//! Content always moves as a stream of bounded chunks
//! ([`BlobConfig::chunk_size`], 4096 bytes by default), so memory use does
//! not grow with blob size.
//!
//! ## Quick Start
//!
//! ```rust
//! use raster_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = MemoryBlobStore::new(BlobConfig::default());
//!
//! let mut txn = store.begin().await?;
//! let put = txn.write(bytes_stream(&b"band data"[..], 4)).await?;
//! assert_eq!(put.bytes_written, 9);
//! txn.commit().await?;
//!
//! let mut txn = store.begin().await?;
//! let mut out = Vec::new();
//! txn.read(&put.blob_ref, &mut out).await?;
//! txn.commit().await?;
//! assert_eq!(out, b"band data");
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Store | Notes |
//! |---|---|
//! | [`MemoryBlobStore`] | process-local, for tests |
//! | [`FsBlobStore`] | staged files renamed into place on commit |
//! | `PgLargeObjectStore` | PostgreSQL large objects, feature `postgres` |

mod config;
mod error;
mod fs_store;
mod memory;
#[cfg(feature = "postgres")]
mod pg_store;
pub mod store;
mod types;

pub use config::{BlobConfig, DEFAULT_CHUNK_SIZE};
pub use error::{BlobError, BlobResult};
pub use fs_store::FsBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "postgres")]
pub use pg_store::PgLargeObjectStore;
pub use store::{BlobSink, BlobStore, BlobTxn, PutResult, StoreCapabilities};
pub use types::{bytes_stream, BlobRef, ByteStream, TxnId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        bytes_stream, BlobConfig, BlobError, BlobRef, BlobResult, BlobStore, BlobTxn, ByteStream,
        FsBlobStore, MemoryBlobStore, PutResult,
    };
}
