use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use image::RgbImage;
use splash_common::config::OracleConfig;
use splash_common::RegionOfInterest;
use tracing::debug;

use crate::mask::SplashMask;

/// A refined mask returned by the segmentation model.
#[derive(Debug, Clone)]
pub struct OraclePrediction {
    pub mask: SplashMask,
    pub confidence: f32,
}

/// Narrow interface to an external segmentation model.
///
/// Given an image and one bounding box, returns zero or one mask. Sessions are
/// single-owner and called one image at a time, hence `&mut self`.
pub trait SegmentationOracle {
    fn predict(
        &mut self,
        image: &RgbImage,
        roi: &RegionOfInterest,
    ) -> Result<Option<OraclePrediction>, OracleError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<O: SegmentationOracle + ?Sized> SegmentationOracle for Box<O> {
    fn predict(
        &mut self,
        image: &RgbImage,
        roi: &RegionOfInterest,
    ) -> Result<Option<OraclePrediction>, OracleError> {
        (**self).predict(image, roi)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("failed to prepare oracle input: {0}")]
    Input(String),
    #[error("failed to spawn oracle command '{command}': {reason}")]
    Spawn { command: String, reason: String },
    #[error("oracle exited with status {0}")]
    Failed(String),
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
    #[error("unreadable oracle output: {0}")]
    Output(String),
    #[error("oracle mask is {got:?}, frame is {expected:?}")]
    Dimensions {
        got: (u32, u32),
        expected: (u32, u32),
    },
}

/// Oracle that never has an answer. Pass 2 then runs on the color mask alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOracle;

impl SegmentationOracle for NoOracle {
    fn predict(
        &mut self,
        _image: &RgbImage,
        _roi: &RegionOfInterest,
    ) -> Result<Option<OraclePrediction>, OracleError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Oracle backed by an external helper command.
///
/// Invoked as `<command> <frame.png> <x1,y1,x2,y2> <mask.png>`. The helper
/// writes a mask PNG (non-zero = splash) and prints its confidence on stdout.
/// Not writing a mask means "no prediction".
pub struct ProcessOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    workdir: tempfile::TempDir,
}

impl ProcessOracle {
    pub fn new(command: &str, timeout: Duration) -> Result<Self, OracleError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::Input("oracle command is empty".into()))?;
        let workdir = tempfile::Builder::new()
            .prefix("splash-oracle")
            .tempdir()
            .map_err(|e| OracleError::Input(e.to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
            workdir,
        })
    }

    /// Build the configured oracle, or `None` when no command is configured.
    pub fn from_config(config: &OracleConfig) -> Result<Option<Self>, OracleError> {
        match config.command.as_deref().map(str::trim) {
            Some(cmd) if !cmd.is_empty() => {
                Self::new(cmd, Duration::from_secs(config.timeout_secs)).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn frame_path(&self) -> PathBuf {
        self.workdir.path().join("frame.png")
    }

    fn mask_path(&self) -> PathBuf {
        self.workdir.path().join("mask.png")
    }
}

impl SegmentationOracle for ProcessOracle {
    fn predict(
        &mut self,
        image: &RgbImage,
        roi: &RegionOfInterest,
    ) -> Result<Option<OraclePrediction>, OracleError> {
        let frame_path = self.frame_path();
        let mask_path = self.mask_path();
        image
            .save(&frame_path)
            .map_err(|e| OracleError::Input(e.to_string()))?;
        if mask_path.exists() {
            std::fs::remove_file(&mask_path).map_err(|e| OracleError::Input(e.to_string()))?;
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&frame_path)
            .arg(roi.to_arg())
            .arg(&mask_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OracleError::Spawn {
                command: self.program.clone(),
                reason: e.to_string(),
            })?;

        // Read while the helper runs; a full pipe would block it.
        let pipe = child.stdout.take();
        let reader = std::thread::spawn(move || {
            let mut out = Vec::new();
            if let Some(mut pipe) = pipe {
                let _ = pipe.read_to_end(&mut out);
            }
            out
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout(self.timeout));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => return Err(OracleError::Failed(e.to_string())),
            }
        };
        let stdout = reader.join().unwrap_or_default();
        if !status.success() {
            return Err(OracleError::Failed(status.to_string()));
        }

        if !mask_path.exists() {
            debug!(oracle = self.name(), "oracle returned no mask");
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let confidence: f32 = stdout
            .trim()
            .parse()
            .map_err(|_| OracleError::Output(format!("bad confidence '{}'", stdout.trim())))?;

        let gray = image::open(&mask_path)
            .map_err(|e| OracleError::Output(e.to_string()))?
            .to_luma8();
        if gray.dimensions() != image.dimensions() {
            return Err(OracleError::Dimensions {
                got: gray.dimensions(),
                expected: image.dimensions(),
            });
        }

        Ok(Some(OraclePrediction {
            mask: SplashMask::from_gray(gray),
            confidence,
        }))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_oracle_never_predicts() {
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);
        assert!(NoOracle.predict(&img, &roi).unwrap().is_none());
    }

    #[test]
    fn unconfigured_command_yields_none() {
        let config = OracleConfig {
            command: Some("   ".into()),
            timeout_secs: 1,
        };
        assert!(ProcessOracle::from_config(&config).unwrap().is_none());
        assert!(ProcessOracle::from_config(&OracleConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let mut oracle =
            ProcessOracle::new("definitely-not-a-real-oracle-binary", Duration::from_secs(1))
                .unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);
        assert!(matches!(
            oracle.predict(&img, &roi),
            Err(OracleError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn helper_without_mask_means_no_prediction() {
        // `true` ignores its arguments and writes nothing.
        let mut oracle = ProcessOracle::new("true", Duration::from_secs(5)).unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);
        assert!(oracle.predict(&img, &roi).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn failing_helper_is_error() {
        let mut oracle = ProcessOracle::new("false", Duration::from_secs(5)).unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);
        assert!(matches!(
            oracle.predict(&img, &roi),
            Err(OracleError::Failed(_))
        ));
    }

    /// Write a shell script into `dir` and return the oracle command for it.
    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        format!("sh {}", path.display())
    }

    #[cfg(unix)]
    #[test]
    fn slow_helper_times_out() {
        let dir = tempfile::tempdir().unwrap();
        // exec so the kill reaches sleep itself and the pipe closes.
        let command = script(dir.path(), "exec sleep 5");
        let mut oracle = ProcessOracle::new(&command, Duration::from_millis(200)).unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);

        let started = Instant::now();
        assert!(matches!(
            oracle.predict(&img, &roi),
            Err(OracleError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn verbose_helper_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        // Well past a pipe buffer, then exits without a mask.
        let command = script(dir.path(), "yes splash | head -c 400000");
        let mut oracle = ProcessOracle::new(&command, Duration::from_secs(5)).unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);
        assert!(oracle.predict(&img, &roi).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn helper_mask_and_confidence_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let mask = dir.path().join("mask_src.png");
        image::GrayImage::from_pixel(4, 4, image::Luma([255u8]))
            .save(&mask)
            .unwrap();
        // Arguments: frame, roi, mask output.
        let command = script(dir.path(), &format!("cp {} \"$3\"\necho 0.75", mask.display()));
        let mut oracle = ProcessOracle::new(&command, Duration::from_secs(5)).unwrap();
        let img = RgbImage::new(4, 4);
        let roi = RegionOfInterest::new(0, 0, 4, 4);

        let prediction = oracle.predict(&img, &roi).unwrap().unwrap();
        assert_eq!(prediction.confidence, 0.75);
        assert_eq!(prediction.mask.count(), 16);
    }
}
