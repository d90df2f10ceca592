use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Local};
use splash_common::config::TransferConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::capture::RemoteClip;
use crate::error::PipelineError;

/// Brings a captured clip to a local, uniquely named file.
pub trait Transfer {
    fn fetch(
        &self,
        clip: &RemoteClip,
    ) -> impl Future<Output = Result<PathBuf, PipelineError>> + Send;
}

/// `splash_YYYYmmdd_HHMMSS.mp4`
pub fn timestamped_name(now: DateTime<Local>) -> String {
    format!("splash_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// Pick a name under `dir` that no file uses yet. Two runs within the same
/// second get `_1`, `_2` suffixes.
async fn unique_destination(dir: &Path) -> Result<PathBuf, PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::Transfer(format!("{}: {e}", dir.display())))?;

    let name = timestamped_name(Local::now());
    let mut candidate = dir.join(&name);
    let stem = name.trim_end_matches(".mp4").to_string();
    let mut n = 1;
    while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = dir.join(format!("{stem}_{n}.mp4"));
        n += 1;
    }
    Ok(candidate)
}

/// Remove a destination a failed transfer left behind.
async fn discard_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %destination.display(), error = %e, "could not remove partial clip"),
    }
}

/// Copies a remote clip with `scp`.
#[derive(Debug, Clone)]
pub struct ScpTransfer {
    local_dir: PathBuf,
    timeout: Duration,
}

impl ScpTransfer {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            local_dir: config.local_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Transfer for ScpTransfer {
    async fn fetch(&self, clip: &RemoteClip) -> Result<PathBuf, PipelineError> {
        let RemoteClip::Ssh { user, host, path } = clip else {
            return Err(PipelineError::Transfer(format!(
                "scp cannot fetch local clip {clip:?}"
            )));
        };
        let destination = unique_destination(&self.local_dir).await?;
        let source = format!("{user}@{host}:{path}");

        let child = Command::new("scp")
            .args(["-q", "-o", "BatchMode=yes"])
            .arg(&source)
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Transfer(format!("failed to spawn scp: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                discard_partial(&destination).await;
                return Err(PipelineError::Transfer(e.to_string()));
            }
            Err(_) => {
                discard_partial(&destination).await;
                return Err(PipelineError::Timeout {
                    stage: "transfer",
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            discard_partial(&destination).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transfer(format!(
                "scp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(source = %source, destination = %destination.display(), "clip transferred");
        Ok(destination)
    }
}

/// Copies a local clip into the working directory. The original file is
/// left alone since the leaderboard takes ownership of what it is handed.
#[derive(Debug, Clone)]
pub struct LocalTransfer {
    local_dir: PathBuf,
    timeout: Duration,
}

impl LocalTransfer {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            local_dir: config.local_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Transfer for LocalTransfer {
    async fn fetch(&self, clip: &RemoteClip) -> Result<PathBuf, PipelineError> {
        let RemoteClip::Local(source) = clip else {
            return Err(PipelineError::Transfer(format!(
                "local transfer cannot fetch remote clip {clip:?}"
            )));
        };
        let mut reader = tokio::fs::File::open(source)
            .await
            .map_err(|e| PipelineError::Transfer(format!("{}: {e}", source.display())))?;
        let destination = unique_destination(&self.local_dir).await?;
        // Created before the deadline starts so a timeout always has a file to remove.
        let mut writer = tokio::fs::File::create(&destination)
            .await
            .map_err(|e| PipelineError::Transfer(format!("{}: {e}", destination.display())))?;

        let copy = async {
            let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            Ok::<_, std::io::Error>(bytes)
        };
        let bytes = match tokio::time::timeout(self.timeout, copy).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                discard_partial(&destination).await;
                return Err(PipelineError::Transfer(format!("{}: {e}", source.display())));
            }
            Err(_) => {
                discard_partial(&destination).await;
                return Err(PipelineError::Timeout {
                    stage: "transfer",
                    secs: self.timeout.as_secs(),
                });
            }
        };

        info!(
            source = %source.display(),
            destination = %destination.display(),
            bytes,
            "clip copied"
        );
        Ok(destination)
    }
}
