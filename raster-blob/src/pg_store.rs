//! PostgreSQL large-object blob store.
//!
//! Every [`BlobTxn`] owns a dedicated connection with an open SQL
//! transaction. Blobs are large objects addressed by their oid; content is
//! moved with `lowrite`/`loread` one chunk at a time so memory stays bounded
//! regardless of blob size. Dropping the transaction closes the connection,
//! which makes the server roll back anything uncommitted.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::store::{BlobSink, WriteBudget};
use crate::{
    BlobConfig, BlobError, BlobRef, BlobResult, BlobStore, BlobTxn, ByteStream, PutResult,
    StoreCapabilities, TxnId,
};

const INV_WRITE: i32 = 0x0002_0000;
const INV_READ: i32 = 0x0004_0000;

#[derive(Debug, Clone)]
pub struct PgLargeObjectStore {
    conn_str: String,
    config: BlobConfig,
}

impl PgLargeObjectStore {
    /// `conn_str` uses the libpq key/value or URL syntax.
    pub fn new(conn_str: impl Into<String>, config: BlobConfig) -> Self {
        Self {
            conn_str: conn_str.into(),
            config,
        }
    }

    async fn connect(&self) -> BlobResult<Client> {
        let (client, connection) = tokio_postgres::connect(&self.conn_str, NoTls)
            .await
            .map_err(BlobError::backend)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "large-object connection closed with error");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl BlobStore for PgLargeObjectStore {
    async fn begin(&self) -> BlobResult<Box<dyn BlobTxn>> {
        let client = self.connect().await?;
        client.batch_execute("BEGIN").await.map_err(BlobError::backend)?;
        let id = TxnId::new();
        debug!(txn = %id, "large-object txn opened");
        Ok(Box::new(PgTxn {
            id,
            client,
            chunk_size: self.config.chunk_size,
            max_blob_bytes: self.config.max_blob_bytes,
            aborted: false,
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic("postgres-large-object")
            .durable()
            .shared()
    }
}

struct PgTxn {
    id: TxnId,
    client: Client,
    chunk_size: usize,
    max_blob_bytes: u64,
    aborted: bool,
}

fn oid_of(blob: &BlobRef) -> BlobResult<u32> {
    blob.as_str()
        .parse::<u32>()
        .map_err(|_| BlobError::invalid(format!("'{blob}' is not a large-object oid")))
}

impl PgTxn {
    fn ensure_open(&self) -> BlobResult<()> {
        if self.aborted {
            return Err(BlobError::closed(self.id.as_str(), "aborted by a failed statement"));
        }
        Ok(())
    }

    async fn exists(&self, oid: u32) -> BlobResult<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_largeobject_metadata WHERE oid = $1)",
                &[&oid],
            )
            .await
            .map_err(BlobError::backend)?;
        Ok(row.get(0))
    }

    async fn open(&self, oid: u32, mode: i32) -> BlobResult<i32> {
        let row = self
            .client
            .query_one("SELECT lo_open($1, $2)", &[&oid, &mode])
            .await
            .map_err(BlobError::backend)?;
        Ok(row.get(0))
    }

    async fn close(&self, fd: i32) -> BlobResult<()> {
        self.client
            .execute("SELECT lo_close($1)", &[&fd])
            .await
            .map_err(BlobError::backend)?;
        Ok(())
    }

    async fn write_object(&self, mut stream: ByteStream) -> BlobResult<PutResult> {
        let row = self
            .client
            .query_one("SELECT lo_create(0)", &[])
            .await
            .map_err(BlobError::backend)?;
        let oid: u32 = row.get(0);
        let fd = self.open(oid, INV_WRITE).await?;
        let lowrite = self
            .client
            .prepare("SELECT lowrite($1, $2)")
            .await
            .map_err(BlobError::backend)?;

        let mut budget = WriteBudget::new(self.max_blob_bytes);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            budget.admit(chunk.len())?;
            for piece in chunk.chunks(self.chunk_size) {
                self.client
                    .execute(&lowrite, &[&fd, &piece])
                    .await
                    .map_err(BlobError::backend)?;
            }
        }
        self.close(fd).await?;

        Ok(PutResult {
            blob_ref: BlobRef(oid.to_string()),
            bytes_written: budget.written(),
        })
    }
}

#[async_trait]
impl BlobTxn for PgTxn {
    fn id(&self) -> &TxnId {
        &self.id
    }

    async fn write(&mut self, stream: ByteStream) -> BlobResult<PutResult> {
        self.ensure_open()?;
        let result = self.write_object(stream).await;
        if result.is_err() {
            self.aborted = true;
        }
        result
    }

    async fn read(&mut self, blob: &BlobRef, sink: &mut BlobSink<'_>) -> BlobResult<u64> {
        self.ensure_open()?;
        let oid = oid_of(blob)?;
        if !self.exists(oid).await? {
            return Err(BlobError::not_found(blob.as_str()));
        }
        let fd = self.open(oid, INV_READ).await?;
        let loread = self
            .client
            .prepare("SELECT loread($1, $2)")
            .await
            .map_err(BlobError::backend)?;
        let len = i32::try_from(self.chunk_size).unwrap_or(i32::MAX);

        let mut total = 0u64;
        loop {
            let row = self
                .client
                .query_one(&loread, &[&fd, &len])
                .await
                .map_err(BlobError::backend)?;
            let chunk: Vec<u8> = row.get(0);
            if chunk.is_empty() {
                break;
            }
            sink.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        sink.flush().await?;
        self.close(fd).await?;
        Ok(total)
    }

    async fn delete(&mut self, blob: &BlobRef) -> BlobResult<()> {
        self.ensure_open()?;
        let oid = oid_of(blob)?;
        if !self.exists(oid).await? {
            return Err(BlobError::not_found(blob.as_str()));
        }
        self.client
            .execute("SELECT lo_unlink($1)", &[&oid])
            .await
            .map_err(BlobError::backend)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BlobResult<()> {
        if self.aborted {
            let _ = self.client.batch_execute("ROLLBACK").await;
            return Err(BlobError::closed(self.id.as_str(), "aborted by a failed statement"));
        }
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(BlobError::backend)?;
        debug!(txn = %self.id, "large-object txn committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BlobResult<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(BlobError::backend)?;
        debug!(txn = %self.id, "large-object txn rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_refs_must_be_oids() {
        assert_eq!(oid_of(&BlobRef::from("16384")).unwrap(), 16384);
        assert!(matches!(
            oid_of(&BlobRef::from("mem-1")).unwrap_err(),
            BlobError::Invalid { .. }
        ));
    }
}
