use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use splash_common::{Frame, VideoInfo};
use tracing::{debug, error, info, warn};

use crate::source::{FrameSource, SourceError};

// ── Decoding ──────────────────────────────────────────────────────────

/// Frame source that decodes through an `ffmpeg` child process emitting raw
/// RGB24 frames on stdout. Seeking restarts the decoder with a frame-exact
/// `select` filter. The child is killed and reaped when the source drops.
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    decoder: Option<Decoder>,
    next_index: usize,
    scratch: Vec<u8>,
}

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.is_file() {
            return Err(SourceError::Open {
                path: path.display().to_string(),
                reason: "no such file".into(),
            });
        }
        let info = probe(path)?;
        info!(
            path = %path.display(),
            frames = info.frame_count,
            fps = info.fps,
            width = info.width,
            height = info.height,
            "video opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
            decoder: None,
            next_index: 0,
            scratch: vec![0; frame_bytes(&info)],
        })
    }

    fn spawn_decoder(&self, start: usize) -> Result<Decoder, SourceError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-nostdin", "-loglevel", "error", "-i"])
            .arg(&self.path);
        if start > 0 {
            cmd.args(["-vf", &format!("select=gte(n\\,{start})")]);
        }
        cmd.args(["-vsync", "0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| SourceError::Open {
            path: self.path.display().to_string(),
            reason: format!("failed to spawn ffmpeg: {e}"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SourceError::Open {
            path: self.path.display().to_string(),
            reason: "could not get ffmpeg stdout".into(),
        })?;
        debug!(path = %self.path.display(), start, "decoder started");
        Ok(Decoder {
            child,
            stdout: BufReader::new(stdout),
        })
    }

    /// Read one raw frame into `scratch`. `false` at end of stream.
    fn read_raw(&mut self) -> Result<bool, SourceError> {
        if self.next_index >= self.info.frame_count {
            return Ok(false);
        }
        if self.decoder.is_none() {
            self.decoder = Some(self.spawn_decoder(self.next_index)?);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(false);
        };
        match decoder.stdout.read_exact(&mut self.scratch) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(index = self.next_index, "decoder reached end of stream");
                Ok(false)
            }
            Err(e) => Err(SourceError::Decode {
                index: self.next_index,
                reason: e.to_string(),
            }),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn seek(&mut self, index: usize) -> Result<(), SourceError> {
        if index > self.info.frame_count {
            return Err(SourceError::SeekOutOfRange {
                index,
                frame_count: self.info.frame_count,
            });
        }
        if self.decoder.is_some() && index == self.next_index {
            return Ok(());
        }
        self.decoder = None;
        self.next_index = index;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.read_raw()? {
            return Ok(None);
        }
        let index = self.next_index;
        let image = RgbImage::from_raw(self.info.width, self.info.height, self.scratch.clone())
            .ok_or_else(|| SourceError::Decode {
                index,
                reason: "short frame buffer".into(),
            })?;
        self.next_index += 1;
        Ok(Some(Frame::new(index, image)))
    }

    fn skip_frame(&mut self) -> Result<bool, SourceError> {
        let read = self.read_raw()?;
        if read {
            self.next_index += 1;
        }
        Ok(read)
    }
}

fn frame_bytes(info: &VideoInfo) -> usize {
    info.width as usize * info.height as usize * 3
}

/// Read frame count, rate and size of the first video stream with `ffprobe`.
pub fn probe(path: &Path) -> Result<VideoInfo, SourceError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,nb_read_packets",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SourceError::Probe(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Probe(stderr.trim().to_string()));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe(text: &str) -> Result<VideoInfo, SourceError> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut nb_frames = None;
    let mut nb_read_packets = None;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "r_frame_rate" => fps = parse_rate(value),
            "nb_frames" => nb_frames = value.parse::<usize>().ok(),
            "nb_read_packets" => nb_read_packets = value.parse::<usize>().ok(),
            _ => {}
        }
    }

    let (Some(width), Some(height)) = (width, height) else {
        return Err(SourceError::Probe("no video stream dimensions".into()));
    };
    let frame_count = nb_read_packets
        .or(nb_frames)
        .ok_or_else(|| SourceError::Probe("frame count unavailable".into()))?;

    Ok(VideoInfo {
        frame_count,
        fps: fps.unwrap_or(0.0),
        width,
        height,
    })
}

/// `"30000/1001"` or `"30"` to frames per second.
fn parse_rate(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.parse().ok(),
    }
}

// ── Encoding ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to write frame to ffmpeg stdin: {0}")]
    Write(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg exited with non-zero status: {0}")]
    FfmpegFailed(String),
    #[error("frame is {got:?}, encoder expects {expected:?}")]
    FrameSize {
        got: (u32, u32),
        expected: (u32, u32),
    },
}

/// Pipes RGB frames into an `ffmpeg` child that writes an H.264 MP4.
pub struct OverlayEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    output_path: PathBuf,
    dimensions: (u32, u32),
    frame_count: u32,
}

impl OverlayEncoder {
    pub fn start(output_path: &Path, width: u32, height: u32, fps: f64) -> Result<Self, EncoderError> {
        let size = format!("{width}x{height}");
        let rate = if fps > 0.0 { fps } else { 30.0 }.to_string();

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &size,
                "-r", &rate,
                "-i", "pipe:0",
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-movflags", "+faststart",
            ])
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Spawn("could not get stdin handle".into()))?;

        debug!(
            output = %output_path.display(),
            size = %size,
            fps = %rate,
            "overlay encoder started"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            output_path: output_path.to_path_buf(),
            dimensions: (width, height),
            frame_count: 0,
        })
    }

    pub fn push_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError> {
        if frame.dimensions() != self.dimensions {
            return Err(EncoderError::FrameSize {
                got: frame.dimensions(),
                expected: self.dimensions,
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncoderError::Write("encoder already closed".into()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| EncoderError::Write(e.to_string()))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Close stdin and wait for ffmpeg to finalize the file.
    pub fn finish(mut self) -> Result<PathBuf, EncoderError> {
        drop(self.stdin.take());

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self
            .child
            .wait()
            .map_err(|e| EncoderError::Wait(e.to_string()))?;

        if !status.success() {
            error!(stderr = %stderr, "ffmpeg exited with error");
            let _ = std::fs::remove_file(&self.output_path);
            return Err(EncoderError::FfmpegFailed(stderr));
        }

        info!(
            frame_count = self.frame_count,
            output = %self.output_path.display(),
            "overlay video complete"
        );
        Ok(self.output_path.clone())
    }
}

impl Drop for OverlayEncoder {
    fn drop(&mut self) {
        // Abandoned without finish(): stop ffmpeg rather than leak it.
        if self.stdin.is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub fn check_ffmpeg_available() -> bool {
    match Command::new("ffmpeg").arg("-version").output() {
        Ok(out) if out.status.success() => {
            debug!("ffmpeg is available");
            true
        }
        Ok(_) => {
            warn!("ffmpeg returned non-zero for -version; decoding may fail");
            false
        }
        Err(e) => {
            warn!(error = %e, "ffmpeg not found on PATH; video analysis will fail");
            false
        }
    }
}
