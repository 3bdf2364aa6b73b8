#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use raster_assets::{
    AssetRegistry, MemoryAssetRegistry, ProcessOutput, ProcessRunner, RasterVault, VaultConfig,
};
use raster_blob::{BlobConfig, ByteStream, MemoryBlobStore};
use raster_core::Dispatch;
use tempfile::TempDir;

/// Stand-in for the render tool. Writes `thumb-<n>` to the output path, or
/// exits with `fail_with` and writes nothing.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_with: Mutex<Option<i32>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    in_flight: Mutex<HashMap<PathBuf, usize>>,
    running: AtomicUsize,
    pub peak_same_input: AtomicUsize,
    pub peak_total: AtomicUsize,
    pub corrupted: AtomicBool,
    pub expected_input: Mutex<Option<Vec<u8>>>,
}

impl FakeRenderer {
    pub fn failing(code: i32) -> Self {
        let fake = Self::default();
        *fake.fail_with.lock() = Some(code);
        fake
    }

    pub fn slow(delay: Duration) -> Self {
        let fake = Self::default();
        *fake.delay.lock() = Some(delay);
        fake
    }

    pub fn set_failing(&self, code: Option<i32>) {
        *self.fail_with.lock() = code;
    }

    fn enter(&self, input: &Path) {
        let same = {
            let mut in_flight = self.in_flight.lock();
            let slot = in_flight.entry(input.to_path_buf()).or_insert(0);
            *slot += 1;
            *slot
        };
        self.peak_same_input.fetch_max(same, Ordering::SeqCst);
        let total = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_total.fetch_max(total, Ordering::SeqCst);
    }

    fn leave(&self, input: &Path) {
        let mut in_flight = self.in_flight.lock();
        if let Some(slot) = in_flight.get_mut(input) {
            *slot -= 1;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessRunner for FakeRenderer {
    async fn run(&self, _program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let input = PathBuf::from(&args[args.len() - 2]);
        let output = PathBuf::from(&args[args.len() - 1]);

        self.enter(&input);
        let before = tokio::fs::read(&input).await?;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let after = tokio::fs::read(&input).await?;
        let expected = self.expected_input.lock().clone();
        if before != after || expected.is_some_and(|e| e != after) {
            self.corrupted.store(true, Ordering::SeqCst);
        }
        self.leave(&input);

        let fail_with = *self.fail_with.lock();
        if let Some(code) = fail_with {
            return Ok(ProcessOutput {
                status: Some(code),
                output: "ERROR 4: not a supported raster\n".to_string(),
            });
        }
        tokio::fs::write(&output, format!("thumb-{n}")).await?;
        Ok(ProcessOutput {
            status: Some(0),
            output: String::new(),
        })
    }
}

pub struct Harness {
    pub vault: RasterVault,
    pub registry: Arc<MemoryAssetRegistry>,
    pub blobs: MemoryBlobStore,
    pub renderer: Arc<FakeRenderer>,
    pub temp: TempDir,
}

impl Harness {
    pub fn new(renderer: FakeRenderer, configure: impl FnOnce(VaultConfig) -> VaultConfig) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = configure(
            VaultConfig::new()
                .with_temp_dir(temp.path())
                .with_dispatch(Dispatch::Inline)
                .with_thumbnail_on_import(false),
        );
        let registry = Arc::new(MemoryAssetRegistry::new());
        let blobs = MemoryBlobStore::new(config.blob.clone());
        let renderer = Arc::new(renderer);
        let vault = RasterVault::new(
            config,
            registry.clone() as Arc<dyn AssetRegistry>,
            Arc::new(blobs.clone()),
            renderer.clone(),
        );
        Self {
            vault,
            registry,
            blobs,
            renderer,
            temp,
        }
    }

    pub fn plain() -> Self {
        Self::new(FakeRenderer::default(), |c| c)
    }

    /// Files currently in the thumbnail temp dir.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.temp.path())
            .expect("read temp dir")
            .map(|e| e.expect("dir entry").path())
            .collect()
    }
}

pub fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

pub fn upload(data: &[u8]) -> ByteStream {
    raster_blob::bytes_stream(data.to_vec(), 1000)
}

/// Yields `len` bytes in uneven chunks, then ends.
pub fn ragged(len: usize) -> ByteStream {
    Box::pin(async_stream::stream! {
        let data = sample(len);
        for piece in data.chunks(333) {
            yield Ok::<Bytes, std::io::Error>(Bytes::copy_from_slice(piece));
        }
    })
}

pub fn small_blobs() -> BlobConfig {
    BlobConfig::new().with_chunk_size(256)
}
