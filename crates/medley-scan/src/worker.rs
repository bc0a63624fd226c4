//! The out-of-process scanner worker.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use medley_core::ScanError;

const READ_CHUNK: usize = 64 * 1024;

/// Arguments a worker is launched with.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub batch: PathBuf,
    pub checkpoint: PathBuf,
    pub incremental: bool,
    pub recursive: bool,
}

impl WorkerCommand {
    /// Command line for a launch; `restart` resumes from the checkpoint.
    pub fn args(&self, restart: bool) -> Vec<String> {
        let mut args = Vec::new();
        if self.incremental {
            args.push("--incremental".to_string());
        }
        if self.recursive {
            args.push("--recursive".to_string());
        }
        if restart {
            args.push("--restart".to_string());
        }
        args.push("--checkpoint".to_string());
        args.push(self.checkpoint.to_string_lossy().into_owned());
        args.push("--batch".to_string());
        args.push(self.batch.to_string_lossy().into_owned());
        args
    }
}

/// A running worker whose stdout is forwarded as chunks over a channel.
pub(crate) struct WorkerProcess {
    child: Child,
    reader: JoinHandle<()>,
}

impl WorkerProcess {
    /// Launch the worker. Stdout chunks arrive on `chunks`; the channel
    /// closes when the worker closes its stdout.
    pub fn spawn(
        command: &WorkerCommand,
        restart: bool,
        chunks: mpsc::Sender<Vec<u8>>,
    ) -> Result<Self, ScanError> {
        let args = command.args(restart);
        debug!(program = %command.program.display(), ?args, "Starting collection scanner");

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScanError::WorkerLaunch {
                path: command.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| ScanError::WorkerLaunch {
            path: command.program.clone(),
            source: std::io::Error::other("worker stdout not captured"),
        })?;

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunks.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "Reading scanner output failed");
                        break;
                    }
                }
            }
        });

        Ok(Self { child, reader })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the worker to exit on its own.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the worker: close its stdout, give it `grace` to exit, then
    /// kill it.
    pub async fn shutdown(mut self, grace: Duration) {
        self.reader.abort();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Scanner exited"),
            Ok(Err(err)) => warn!(error = %err, "Waiting for scanner failed"),
            Err(_) => {
                debug!(pid = ?self.child.id(), "Scanner did not exit in time, killing it");
                if let Err(err) = self.child.start_kill() {
                    warn!(error = %err, "Killing scanner failed");
                }
                let _ = self.child.wait().await;
            }
        }
    }
}

/// Ask the worker binary for its version.
pub async fn worker_version(program: &Path) -> Result<String, ScanError> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ScanError::WorkerLaunch {
            path: program.to_path_buf(),
            source,
        })?;
    let text = String::from_utf8_lossy(&output.stdout);
    // "medley-scanner 0.1.0" or just "0.1.0"
    Ok(text
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string())
}
