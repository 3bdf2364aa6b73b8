use std::path::PathBuf;
use std::time::Duration;

use raster_blob::BlobConfig;
use raster_core::{ConfigSnapshot, Dispatch};
use tracing::warn;

/// Default bound on one render invocation.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// What to do when the blob of an asset being deleted cannot be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Log the blob failure and still remove the record.
    #[default]
    BestEffort,
    /// Abort; the record and blob stay as they were. A blob commit that
    /// fails after the record was removed leaves an orphaned blob, which
    /// is logged.
    Strict,
}

/// Settings for the vault pipelines.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub blob: BlobConfig,
    /// Where thumbnail temp files are created.
    pub temp_dir: PathBuf,
    /// Interpreter or binary of the render tool.
    pub render_executable: PathBuf,
    /// First argument passed to the render tool, typically its script.
    pub render_script: Option<PathBuf>,
    /// `None` waits forever.
    pub render_timeout: Option<Duration>,
    /// Subscribe thumbnail generation to the imported notification.
    pub thumbnail_on_import: bool,
    pub dispatch: Dispatch,
    pub delete_policy: DeletePolicy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            blob: BlobConfig::default(),
            temp_dir: std::env::temp_dir(),
            render_executable: PathBuf::from("python3"),
            render_script: Some(PathBuf::from("tiff_thumbnail.py")),
            render_timeout: Some(DEFAULT_RENDER_TIMEOUT),
            thumbnail_on_import: true,
            dispatch: Dispatch::Spawn,
            delete_policy: DeletePolicy::BestEffort,
        }
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay recognised keys from `snap` on top of the defaults.
    ///
    /// | key | field |
    /// |---|---|
    /// | `blob.chunk_size` | `blob.chunk_size` |
    /// | `blob.max_bytes` | `blob.max_blob_bytes` |
    /// | `thumbnail.temp_dir` | `temp_dir` |
    /// | `thumbnail.on_import` | `thumbnail_on_import` |
    /// | `render.executable` | `render_executable` |
    /// | `render.script` | `render_script` (empty disables) |
    /// | `render.timeout_secs` | `render_timeout` (`0` disables, unparsable keeps the default) |
    /// | `events.dispatch` | `dispatch` (`inline` / `spawn`) |
    /// | `delete.strict` | `delete_policy` |
    pub fn from_snapshot(snap: &ConfigSnapshot) -> Self {
        let mut config = Self::default();

        if let Some(size) = snap.get_usize("blob.chunk_size") {
            config.blob = config.blob.with_chunk_size(size);
        }
        if let Some(max) = snap.get_u64("blob.max_bytes") {
            config.blob = config.blob.with_max_blob_bytes(max);
        }
        if let Some(dir) = snap.get_string("thumbnail.temp_dir") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(on) = snap.get_bool("thumbnail.on_import") {
            config.thumbnail_on_import = on;
        }
        if let Some(exe) = snap.get_string("render.executable") {
            config.render_executable = PathBuf::from(exe);
        }
        if let Some(script) = snap.get_string("render.script") {
            config.render_script = (!script.trim().is_empty()).then(|| PathBuf::from(script));
        }
        if let Some(raw) = snap.get("render.timeout_secs") {
            match snap.get_u64("render.timeout_secs") {
                Some(0) => config.render_timeout = None,
                Some(secs) => config.render_timeout = Some(Duration::from_secs(secs)),
                None => warn!(value = raw, "ignoring malformed render.timeout_secs"),
            }
        }
        if let Some(dispatch) = snap.get("events.dispatch").and_then(Dispatch::parse) {
            config.dispatch = dispatch;
        }
        if let Some(strict) = snap.get_bool("delete.strict") {
            config.delete_policy = if strict {
                DeletePolicy::Strict
            } else {
                DeletePolicy::BestEffort
            };
        }
        config
    }

    pub fn with_blob(mut self, blob: BlobConfig) -> Self {
        self.blob = blob;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_render_command(mut self, executable: impl Into<PathBuf>, script: Option<PathBuf>) -> Self {
        self.render_executable = executable.into();
        self.render_script = script;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_thumbnail_on_import(mut self, on: bool) -> Self {
        self.thumbnail_on_import = on;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }
}
