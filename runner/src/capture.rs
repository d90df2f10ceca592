use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use splash_common::config::CaptureConfig;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::PipelineError;

/// Where a freshly recorded clip lives before transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteClip {
    Ssh {
        user: String,
        host: String,
        path: String,
    },
    Local(PathBuf),
}

/// Records one clip. Implementations enforce their own deadline.
pub trait Capture {
    fn capture(&self) -> impl Future<Output = Result<RemoteClip, PipelineError>> + Send;
}

/// Records on the camera host by running ffmpeg over ssh.
#[derive(Debug, Clone)]
pub struct SshCapture {
    user: String,
    host: String,
    remote_path: String,
    device: String,
    duration_secs: u64,
    width: u32,
    height: u32,
    fps: u32,
    timeout: Duration,
}

impl SshCapture {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            user: config.user.clone(),
            host: config.host.clone(),
            remote_path: config.remote_path.clone(),
            device: config.device.clone(),
            duration_secs: config.duration_secs,
            width: config.width,
            height: config.height,
            fps: config.fps,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Shell command executed on the camera host.
    pub fn remote_command(&self) -> String {
        format!(
            "ffmpeg -hide_banner -loglevel error -y -f v4l2 -input_format mjpeg \
             -video_size {w}x{h} -i {device} -t {t} \
             -vf \"eq=brightness=0.05:contrast=1.3:saturation=1.2,fps={fps}\" \
             -vsync cfr -c:v libx264 -pix_fmt yuv420p -crf 18 -preset veryfast {out}",
            w = self.width,
            h = self.height,
            device = self.device,
            t = self.duration_secs,
            fps = self.fps,
            out = self.remote_path,
        )
    }
}

impl Capture for SshCapture {
    async fn capture(&self) -> Result<RemoteClip, PipelineError> {
        let remote = self.remote_command();
        debug!(host = %self.host, command = %remote, "starting remote capture");

        let child = Command::new("ssh")
            .args(["-o", "BatchMode=yes"])
            .arg(self.destination())
            .arg(&remote)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Capture(format!("failed to spawn ssh: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: "capture",
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| PipelineError::Capture(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Capture(format!(
                "remote ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(
            host = %self.host,
            path = %self.remote_path,
            duration_secs = self.duration_secs,
            "clip recorded"
        );
        Ok(RemoteClip::Ssh {
            user: self.user.clone(),
            host: self.host.clone(),
            path: self.remote_path.clone(),
        })
    }
}

/// Uses an existing video file instead of recording.
#[derive(Debug, Clone)]
pub struct LocalCapture {
    path: PathBuf,
}

impl LocalCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self, PipelineError> {
        config
            .local_video
            .clone()
            .map(Self::new)
            .ok_or_else(|| PipelineError::Capture("capture.local_video is not set".into()))
    }
}

impl Capture for LocalCapture {
    async fn capture(&self) -> Result<RemoteClip, PipelineError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(RemoteClip::Local(self.path.clone())),
            Ok(_) => Err(PipelineError::Capture(format!(
                "{} is not a file",
                self.path.display()
            ))),
            Err(e) => Err(PipelineError::Capture(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh() -> SshCapture {
        SshCapture::from_config(&CaptureConfig {
            user: "pi".into(),
            host: "10.0.0.5".into(),
            ..CaptureConfig::default()
        })
    }

    #[test]
    fn remote_command_carries_camera_settings() {
        let cmd = ssh().remote_command();
        assert!(cmd.contains("-video_size 1280x720"));
        assert!(cmd.contains("-i /dev/video0 -t 5"));
        assert!(cmd.contains("fps=30\""));
        assert!(cmd.contains("-crf 18"));
        assert!(cmd.ends_with("/home/pi/splash.mp4"));
        assert_eq!(ssh().destination(), "pi@10.0.0.5");
    }

    #[tokio::test]
    async fn local_capture_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = LocalCapture::new(dir.path().join("none.mp4"));
        assert!(matches!(
            missing.capture().await,
            Err(PipelineError::Capture(_))
        ));

        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"clip").unwrap();
        let clip = LocalCapture::new(&path).capture().await.unwrap();
        assert_eq!(clip, RemoteClip::Local(path));
    }

    #[test]
    fn local_capture_needs_a_path() {
        assert!(LocalCapture::from_config(&CaptureConfig::default()).is_err());
    }
}
