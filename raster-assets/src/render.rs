//! External thumbnail renderer.
//!
//! The tool is invoked as `<executable> [script] <input> <output>`. It
//! succeeds when it exits with status 0 and leaves a non-empty file at
//! `output`. Process spawning sits behind [`ProcessRunner`] so tests can
//! substitute a fake.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raster_core::{RasterError, RasterResult};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::VaultConfig;

/// What a finished process reported.
///
/// The two pipes are captured separately, so `output` holds all of stdout
/// and then all of stderr. Lines written alternately to both streams do
/// not keep their relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when terminated by a signal.
    pub status: Option<i32>,
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    async fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput>;
}

/// Spawns real processes through `tokio::process`. The child is killed if
/// the returned future is dropped, e.g. by a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput> {
        let out = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ProcessOutput {
            status: out.status.code(),
            output,
        })
    }
}

#[derive(Clone)]
pub struct RenderTool {
    executable: PathBuf,
    script: Option<PathBuf>,
    timeout: Option<Duration>,
    runner: Arc<dyn ProcessRunner>,
}

impl RenderTool {
    pub fn new(executable: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: executable.into(),
            script: None,
            timeout: None,
            runner,
        }
    }

    pub fn from_config(config: &VaultConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: config.render_executable.clone(),
            script: config.render_script.clone(),
            timeout: config.render_timeout,
            runner,
        }
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args = Vec::with_capacity(3);
        if let Some(script) = &self.script {
            args.push(script.clone().into_os_string());
        }
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        args
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.executable.as_os_str())
            .chain(args.iter().map(|a| a.as_os_str()))
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render `input` into `output`.
    #[instrument(skip(self), fields(tool = %self.executable.display()))]
    pub async fn render(&self, input: &Path, output: &Path) -> RasterResult<()> {
        let args = self.args(input, output);
        let command = self.command_line(&args);
        debug!(%command, "invoking render tool");

        // A file left by an earlier crashed run must not pass for fresh output.
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!(output = %output.display(), "removed stale render output"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(RasterError::io_failure(format!(
                    "could not clear render output {}: {err}",
                    output.display()
                ))
                .with_source(err))
            }
        }

        let run = self.runner.run(&self.executable, &args);
        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                warn!(%command, ?limit, "render tool timed out");
                RasterError::timeout(format!("render tool did not finish within {limit:?}"))
                    .with_data(json!({ "command": command }))
            })?,
            None => run.await,
        };
        let finished = finished.map_err(|err| {
            RasterError::render_failure(format!("could not start render tool: {err}"))
                .with_data(json!({ "command": command }))
                .with_source(err)
        })?;

        if !finished.success() {
            warn!(%command, status = ?finished.status, output = %finished.output, "render tool failed");
            return Err(RasterError::render_failure(match finished.status {
                Some(code) => format!("render tool exited with status {code}"),
                None => "render tool was terminated by a signal".to_string(),
            })
            .with_data(json!({
                "command": command,
                "exitCode": finished.status,
                "output": finished.output,
            })));
        }

        let produced = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if produced == 0 {
            warn!(%command, output = %finished.output, "render tool produced no output file");
            return Err(RasterError::render_failure("render tool produced no thumbnail")
                .with_data(json!({
                    "command": command,
                    "exitCode": finished.status,
                    "output": finished.output,
                })));
        }
        Ok(())
    }
}
