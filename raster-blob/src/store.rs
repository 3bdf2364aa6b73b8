use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{BlobError, BlobRef, BlobResult, ByteStream, TxnId};

/// Caller-supplied destination for [`BlobTxn::read`].
pub type BlobSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Entry point of a storage backend. All blob work happens inside a
/// [`BlobTxn`] the caller opens, and later commits or rolls back.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> BlobResult<Box<dyn BlobTxn>>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// A unit of blob work.
///
/// Nothing written or deleted through a transaction is visible to other
/// transactions until [`commit`](BlobTxn::commit). Dropping a transaction
/// without committing discards everything it staged, so early returns and
/// `?` release it on every path.
///
/// After a failed `write` the transaction is aborted: `commit` refuses and
/// the partial blob is discarded.
#[async_trait]
pub trait BlobTxn: Send {
    fn id(&self) -> &TxnId;

    /// Stream `stream` into a newly allocated blob. The reference is
    /// returned only after every chunk was accepted by the backend.
    async fn write(&mut self, stream: ByteStream) -> BlobResult<PutResult>;

    /// Stream the full content of `blob` into `sink` chunk by chunk.
    /// Returns the number of bytes copied.
    async fn read(&mut self, blob: &BlobRef, sink: &mut BlobSink<'_>) -> BlobResult<u64>;

    /// Remove `blob`. Unknown references are `NotFound`.
    async fn delete(&mut self, blob: &BlobRef) -> BlobResult<()>;

    async fn commit(self: Box<Self>) -> BlobResult<()>;

    async fn rollback(self: Box<Self>) -> BlobResult<()>;
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub blob_ref: BlobRef,
    pub bytes_written: u64,
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub backend: &'static str,
    /// Survives process restart.
    pub durable: bool,
    /// Visible to other processes sharing the backend.
    pub shared: bool,
}

impl StoreCapabilities {
    pub fn basic(backend: &'static str) -> Self {
        Self {
            backend,
            durable: false,
            shared: false,
        }
    }

    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }
}

/// Running byte count for one write, enforcing `max_blob_bytes`.
#[derive(Debug)]
pub(crate) struct WriteBudget {
    limit: u64,
    written: u64,
}

impl WriteBudget {
    pub(crate) fn new(limit: u64) -> Self {
        Self { limit, written: 0 }
    }

    pub(crate) fn admit(&mut self, len: usize) -> BlobResult<()> {
        let next = self.written + len as u64;
        if next > self.limit {
            return Err(BlobError::TooLarge { limit: self.limit });
        }
        self.written = next;
        Ok(())
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }
}

/// Copy `reader` into `sink` using a `chunk_size` buffer.
pub(crate) async fn pump<R>(reader: &mut R, sink: &mut BlobSink<'_>, chunk_size: usize) -> BlobResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    sink.flush().await?;
    Ok(total)
}
