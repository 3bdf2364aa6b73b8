use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Opaque reference to a stored blob.
///
/// Each backend decides the encoding (a large-object oid, a file name, a
/// counter); callers only persist and hand it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlobRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one open transaction, used in logs and staging paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnId(pub String);

impl TxnId {
    pub fn new() -> Self {
        Self(format!("txn_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrap an in-memory payload as a [`ByteStream`] yielding `chunk_size` pieces.
pub fn bytes_stream(data: impl Into<Bytes>, chunk_size: usize) -> ByteStream {
    let data: Bytes = data.into();
    let step = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(data.len() / step + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + step).min(data.len());
        chunks.push(Ok(data.slice(offset..end)));
        offset = end;
    }
    Box::pin(futures_util::stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn bytes_stream_splits_evenly() {
        let chunks: Vec<_> = bytes_stream(vec![7u8; 10], 4).collect().await;
        let sizes: Vec<usize> = chunks.into_iter().map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn empty_payload_is_empty_stream() {
        let mut stream = bytes_stream(Bytes::new(), 4096);
        assert!(stream.next().await.is_none());
    }
}
