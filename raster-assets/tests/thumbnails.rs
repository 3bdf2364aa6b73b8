mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use raster_assets::{AssetEvent, AssetId, ImportRequest, THUMBNAIL_CONTENT_TYPE};
use raster_core::{Dispatch, ErrorKind, EventKind};
use tracing_test::traced_test;

use common::{sample, upload, FakeRenderer, Harness};

async fn imported(h: &Harness, name: &str, len: usize) -> AssetId {
    h.vault
        .import(ImportRequest::new(name, len as u64), upload(&sample(len)))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn regeneration_keeps_only_the_latest_thumbnail() {
    let h = Harness::plain();
    let id = imported(&h, "scan.tif", 2048).await;

    h.vault.generate_and_store(id).await.unwrap();
    assert!(h.temp_files().is_empty());
    let first = h.vault.thumbnail(id).await.unwrap();
    assert_eq!(first.bytes, b"thumb-1");
    assert_eq!(first.content_type, THUMBNAIL_CONTENT_TYPE);

    let record = h.vault.generate_and_store(id).await.unwrap();
    assert!(h.temp_files().is_empty());
    assert_eq!(record.thumbnail.as_deref(), Some(&b"thumb-2"[..]));
    assert_eq!(h.vault.thumbnail(id).await.unwrap().bytes, b"thumb-2");
}

#[tokio::test]
async fn temp_paths_embed_the_asset_id() {
    let h = Harness::plain();
    let (input, output) = h.vault.thumbnails().temp_paths(AssetId(42));
    assert_eq!(input, h.temp.path().join("raster_42.tif"));
    assert_eq!(output, h.temp.path().join("raster_42.tif.thumbnail.jpg"));
}

#[tokio::test]
async fn failed_render_cleans_up_and_keeps_previous_thumbnail() {
    let h = Harness::plain();
    let id = imported(&h, "scan.tif", 512).await;
    h.vault.generate_and_store(id).await.unwrap();

    h.renderer.set_failing(Some(1));
    let err = h.vault.generate_and_store(id).await.unwrap_err();

    assert!(err.is(ErrorKind::RenderFailure));
    let data = err.data.unwrap();
    assert_eq!(data["exitCode"], 1);
    assert!(data["output"].as_str().unwrap().contains("not a supported raster"));
    assert!(h.temp_files().is_empty());
    assert_eq!(h.vault.thumbnail(id).await.unwrap().bytes, b"thumb-1");
}

#[tokio::test]
async fn failed_first_render_leaves_no_thumbnail() {
    let h = Harness::new(FakeRenderer::failing(1), |c| c);
    let id = imported(&h, "scan.tif", 512).await;

    let err = h.vault.generate_and_store(id).await.unwrap_err();
    assert!(err.is(ErrorKind::RenderFailure));
    assert!(h.temp_files().is_empty());
    assert!(h.vault.get(id).await.unwrap().thumbnail.is_none());
    assert!(h.vault.thumbnail(id).await.unwrap_err().is(ErrorKind::NotFound));
}

#[tokio::test]
async fn hung_renderer_times_out_and_cleans_up() {
    let h = Harness::new(FakeRenderer::slow(Duration::from_secs(10)), |c| {
        c.with_render_timeout(Some(Duration::from_millis(50)))
    });
    let id = imported(&h, "scan.tif", 128).await;

    let err = h.vault.generate_and_store(id).await.unwrap_err();
    assert!(err.is(ErrorKind::Timeout));
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn empty_asset_cannot_be_rendered() {
    let h = Harness::plain();
    let id = imported(&h, "blank.tif", 0).await;

    let err = h.vault.generate_and_store(id).await.unwrap_err();
    assert!(err.is(ErrorKind::IoFailure));
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn unknown_asset_is_not_found() {
    let h = Harness::plain();
    let err = h.vault.generate_and_store(AssetId(77)).await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_id_generations_are_serialized() {
    let h = Arc::new(Harness::new(FakeRenderer::slow(Duration::from_millis(30)), |c| c));
    let id = imported(&h, "scan.tif", 4096).await;
    *h.renderer.expected_input.lock() = Some(sample(4096));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move { h.vault.generate_and_store(id).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.renderer.peak_same_input.load(Ordering::SeqCst), 1);
    assert!(!h.renderer.corrupted.load(Ordering::SeqCst));
    assert!(h.temp_files().is_empty());
    assert!(h.vault.thumbnail(id).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_ids_render_concurrently() {
    let h = Arc::new(Harness::new(FakeRenderer::slow(Duration::from_millis(200)), |c| c));
    let a = imported(&h, "a.tif", 256).await;
    let b = imported(&h, "b.tif", 256).await;

    let (ra, rb) = tokio::join!(
        h.vault.generate_and_store(a),
        h.vault.generate_and_store(b)
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(h.renderer.peak_total.load(Ordering::SeqCst), 2);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
#[traced_test]
async fn failing_thumbnail_after_import_does_not_fail_the_import() {
    let h = Harness::new(FakeRenderer::failing(1), |c| c.with_thumbnail_on_import(true));
    let record = h
        .vault
        .import(
            ImportRequest::new("scan.tif", 10_000).with_description("field survey"),
            upload(&sample(10_000)),
        )
        .await
        .unwrap();

    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
    assert!(logs_contain("thumbnail generation after import failed"));
    assert!(h.vault.get(record.id).await.unwrap().thumbnail.is_none());
    assert!(h.temp_files().is_empty());

    // Still retriable once the tool recovers.
    h.renderer.set_failing(None);
    h.vault.generate_and_store(record.id).await.unwrap();
    assert!(h.vault.thumbnail(record.id).await.is_ok());
}

#[tokio::test]
async fn import_triggers_thumbnail_inline() {
    let h = Harness::new(FakeRenderer::default(), |c| c.with_thumbnail_on_import(true));
    let id = imported(&h, "scan.tif", 1000).await;

    assert_eq!(h.vault.thumbnail(id).await.unwrap().bytes, b"thumb-1");
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn stored_thumbnails_are_announced_as_updates() {
    let h = Harness::new(FakeRenderer::default(), |c| c.with_thumbnail_on_import(true));
    let updates = Arc::new(AtomicUsize::new(0));
    let seen = updates.clone();
    h.vault.events().on(
        EventKind::Updated,
        Arc::new(move |_ev: AssetEvent| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        }),
    );

    let id = imported(&h, "scan.tif", 1000).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    h.vault.generate_and_store(id).await.unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_import_thumbnail_is_not_announced() {
    let h = Harness::new(FakeRenderer::failing(2), |c| c.with_thumbnail_on_import(true));
    let updates = Arc::new(AtomicUsize::new(0));
    let seen = updates.clone();
    h.vault.events().on(
        EventKind::Updated,
        Arc::new(move |_ev: AssetEvent| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        }),
    );

    imported(&h, "scan.tif", 1000).await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn import_triggers_thumbnail_in_background() {
    let h = Harness::new(FakeRenderer::default(), |c| {
        c.with_thumbnail_on_import(true).with_dispatch(Dispatch::Spawn)
    });
    let id = imported(&h, "scan.tif", 1000).await;

    let mut ready = false;
    for _ in 0..100 {
        if h.vault.thumbnail(id).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready, "background thumbnail never arrived");
}

#[tokio::test]
async fn detached_vault_skips_thumbnails() {
    let mut h = Harness::new(FakeRenderer::default(), |c| c.with_thumbnail_on_import(true));
    assert!(h.vault.detach_thumbnails());
    assert!(!h.vault.detach_thumbnails());

    imported(&h, "scan.tif", 100).await;
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
}
