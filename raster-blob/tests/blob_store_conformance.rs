use bytes::Bytes;
use raster_blob::prelude::*;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn failing_after(good: usize) -> ByteStream {
    Box::pin(async_stream::stream! {
        yield Ok(Bytes::from(vec![1u8; good]));
        yield Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away"));
    })
}

async fn read_all(store: &dyn BlobStore, blob: &BlobRef) -> BlobResult<Vec<u8>> {
    let mut txn = store.begin().await?;
    let mut out = Vec::new();
    txn.read(blob, &mut out).await?;
    txn.commit().await?;
    Ok(out)
}

async fn committed_write_is_readable(store: &dyn BlobStore) {
    let data = payload(10_000);
    let mut txn = store.begin().await.unwrap();
    let put = txn.write(bytes_stream(data.clone(), 1000)).await.unwrap();
    assert_eq!(put.bytes_written, 10_000);
    txn.commit().await.unwrap();

    assert_eq!(read_all(store, &put.blob_ref).await.unwrap(), data);
}

async fn rollback_hides_write(store: &dyn BlobStore) {
    let mut txn = store.begin().await.unwrap();
    let put = txn.write(bytes_stream(payload(64), 16)).await.unwrap();
    txn.rollback().await.unwrap();

    assert!(read_all(store, &put.blob_ref).await.unwrap_err().is_not_found());
}

async fn dropped_txn_hides_write(store: &dyn BlobStore) {
    let blob = {
        let mut txn = store.begin().await.unwrap();
        txn.write(bytes_stream(payload(64), 16)).await.unwrap().blob_ref
    };
    assert!(read_all(store, &blob).await.unwrap_err().is_not_found());
}

async fn failed_stream_aborts_txn(store: &dyn BlobStore) {
    let mut txn = store.begin().await.unwrap();
    let err = txn.write(failing_after(480)).await.unwrap_err();
    assert!(matches!(err, BlobError::Io { .. }));
    assert!(matches!(
        txn.commit().await.unwrap_err(),
        BlobError::TransactionClosed { .. }
    ));
}

async fn delete_then_missing(store: &dyn BlobStore) {
    let mut txn = store.begin().await.unwrap();
    let put = txn.write(bytes_stream(payload(32), 8)).await.unwrap();
    txn.commit().await.unwrap();

    let mut txn = store.begin().await.unwrap();
    txn.delete(&put.blob_ref).await.unwrap();
    txn.commit().await.unwrap();

    assert!(read_all(store, &put.blob_ref).await.unwrap_err().is_not_found());

    let mut txn = store.begin().await.unwrap();
    assert!(txn.delete(&put.blob_ref).await.unwrap_err().is_not_found());
}

async fn empty_blob_roundtrip(store: &dyn BlobStore) {
    let mut txn = store.begin().await.unwrap();
    let put = txn.write(bytes_stream(Bytes::new(), 8)).await.unwrap();
    assert_eq!(put.bytes_written, 0);
    txn.commit().await.unwrap();
    assert!(read_all(store, &put.blob_ref).await.unwrap().is_empty());
}

async fn conformance(store: &dyn BlobStore) {
    committed_write_is_readable(store).await;
    rollback_hides_write(store).await;
    dropped_txn_hides_write(store).await;
    failed_stream_aborts_txn(store).await;
    delete_then_missing(store).await;
    empty_blob_roundtrip(store).await;
}

#[tokio::test]
async fn memory_store_conforms() {
    let store = MemoryBlobStore::new(BlobConfig::default());
    conformance(&store).await;
}

#[tokio::test]
async fn fs_store_conforms() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path(), BlobConfig::new().with_chunk_size(512))
        .await
        .unwrap();
    conformance(&store).await;
}

#[tokio::test]
async fn fs_store_leaves_no_staging_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path(), BlobConfig::default()).await.unwrap();

    {
        let mut txn = store.begin().await.unwrap();
        let _ = txn.write(failing_after(100)).await;
    }
    let mut txn = store.begin().await.unwrap();
    txn.write(bytes_stream(payload(10), 4)).await.unwrap();
    txn.commit().await.unwrap();

    let staging: Vec<_> = std::fs::read_dir(dir.path().join(".staging"))
        .unwrap()
        .collect();
    assert!(staging.is_empty());
}

#[tokio::test]
async fn fs_store_rejects_path_like_refs() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path(), BlobConfig::default()).await.unwrap();
    let mut txn = store.begin().await.unwrap();
    let mut out = Vec::new();
    let err = txn
        .read(&BlobRef::from("../etc/passwd"), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::Invalid { .. }));
}

#[tokio::test]
async fn store_reports_capabilities() {
    let memory = MemoryBlobStore::default();
    assert_eq!(memory.capabilities().backend, "memory");
    assert!(!memory.capabilities().durable);

    let dir = tempfile::tempdir().unwrap();
    let fs = FsBlobStore::open(dir.path(), BlobConfig::default()).await.unwrap();
    assert!(fs.capabilities().durable);
}
