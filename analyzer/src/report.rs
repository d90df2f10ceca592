use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use image::RgbImage;
use splash_common::{RegionOfInterest, VideoInfo};
use tracing::{info, warn};

use crate::ffmpeg::{EncoderError, OverlayEncoder};
use crate::locator::{FrameObserver, LocatorResult, ScoreRecord};
use crate::mask::SplashMask;
use crate::overlay::annotate;

pub const BEST_FRAME_FILE: &str = "best_splash_frame.png";
pub const BEST_FRAME_MASK_FILE: &str = "best_splash_frame_with_mask.png";
pub const SCORES_FILE: &str = "scores.csv";
pub const OVERLAY_VIDEO_FILE: &str = "splash_overlay.mp4";

const SCORES_HEADER: &str = "frame,score,area,hull_area,height,width";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create results directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Paths of the analysis artifacts written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// The clean best frame. Used as the leaderboard thumbnail.
    pub best_frame: PathBuf,
    pub best_frame_with_mask: PathBuf,
    pub scores: PathBuf,
    pub overlay_video: Option<PathBuf>,
}

/// Write the best frame (clean and annotated) and the pass-2 score log.
pub fn write_report(
    dir: &Path,
    result: &LocatorResult,
    roi: &RegionOfInterest,
) -> Result<ReportPaths, ReportError> {
    ensure_dir(dir)?;

    let best_frame = dir.join(BEST_FRAME_FILE);
    save_png(&result.best_frame, &best_frame)?;

    let annotated = annotate(
        &result.best_frame,
        &result.best_mask,
        roi,
        result.best_score,
        true,
    );
    let best_frame_with_mask = dir.join(BEST_FRAME_MASK_FILE);
    save_png(&annotated, &best_frame_with_mask)?;

    let scores = dir.join(SCORES_FILE);
    std::fs::write(&scores, scores_csv(&result.log)).map_err(|e| ReportError::Write {
        path: scores.display().to_string(),
        reason: e.to_string(),
    })?;

    info!(
        dir = %dir.display(),
        best_frame = result.best_index,
        rows = result.log.len(),
        "report written"
    );

    Ok(ReportPaths {
        best_frame,
        best_frame_with_mask,
        scores,
        overlay_video: None,
    })
}

/// Render the diagnostic log as CSV, score with four decimals.
pub fn scores_csv(log: &[ScoreRecord]) -> String {
    let mut out = String::with_capacity(SCORES_HEADER.len() + 1 + log.len() * 32);
    out.push_str(SCORES_HEADER);
    out.push('\n');
    for r in log {
        let _ = writeln!(
            out,
            "{},{:.4},{},{},{},{}",
            r.frame_index,
            r.score,
            r.metrics.area,
            r.metrics.hull_area,
            r.metrics.height,
            r.metrics.width
        );
    }
    out
}

fn ensure_dir(dir: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(dir).map_err(|e| ReportError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })
}

fn save_png(image: &RgbImage, path: &Path) -> Result<(), ReportError> {
    image.save(path).map_err(|e| ReportError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Frame observer that annotates each pass-2 frame and streams it into an
/// overlay video. Encoding problems are logged once and stop the video
/// without affecting analysis.
pub struct OverlayVideo {
    encoder: Option<OverlayEncoder>,
    roi: RegionOfInterest,
}

impl OverlayVideo {
    pub fn start(dir: &Path, info: &VideoInfo, roi: RegionOfInterest) -> Result<Self, ReportError> {
        ensure_dir(dir)?;
        let encoder = OverlayEncoder::start(
            &dir.join(OVERLAY_VIDEO_FILE),
            info.width,
            info.height,
            info.fps,
        )?;
        Ok(Self {
            encoder: Some(encoder),
            roi,
        })
    }

    /// Finalize the video. `None` if encoding was abandoned along the way.
    pub fn finish(self) -> Option<PathBuf> {
        let encoder = self.encoder?;
        match encoder.finish() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "overlay video failed");
                None
            }
        }
    }
}

impl FrameObserver for OverlayVideo {
    fn observe(
        &mut self,
        frame: &RgbImage,
        mask: &SplashMask,
        record: &ScoreRecord,
        is_peak: bool,
    ) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let annotated = annotate(frame, mask, &self.roi, record.score, is_peak);
        if let Err(e) = encoder.push_frame(&annotated) {
            warn!(frame = record.frame_index, error = %e, "dropping overlay video");
            self.encoder = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::SplashMetrics;

    fn record(frame_index: usize, score: f64) -> ScoreRecord {
        ScoreRecord {
            frame_index,
            score,
            metrics: SplashMetrics {
                area: 1200,
                hull_area: 3400,
                height: 88,
                width: 41,
            },
        }
    }

    fn result() -> LocatorResult {
        let mut mask = SplashMask::empty(32, 24);
        mask.set(10, 10, true);
        LocatorResult {
            approx_peak_index: 60,
            approx_peak_score: 42.0,
            sampled: 50,
            best_index: 58,
            best_score: 47.3,
            best_metrics: record(58, 47.3).metrics,
            best_frame: RgbImage::from_pixel(32, 24, image::Rgb([9, 9, 9])),
            best_mask: mask,
            log: vec![record(57, 40.0), record(58, 47.3)],
        }
    }

    #[test]
    fn csv_has_header_and_four_decimal_scores() {
        let csv = scores_csv(&[record(55, 12.345678), record(56, 0.0)]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "frame,score,area,hull_area,height,width");
        assert_eq!(lines[1], "55,12.3457,1200,3400,88,41");
        assert_eq!(lines[2], "56,0.0000,1200,3400,88,41");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_log_is_header_only() {
        assert_eq!(scores_csv(&[]), "frame,score,area,hull_area,height,width\n");
    }

    #[test]
    fn report_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let roi = RegionOfInterest::new(2, 2, 20, 20);
        let paths = write_report(&out, &result(), &roi).unwrap();

        assert!(paths.best_frame.is_file());
        assert!(paths.best_frame_with_mask.is_file());
        assert!(paths.overlay_video.is_none());

        let clean = image::open(&paths.best_frame).unwrap().to_rgb8();
        assert_eq!(clean.get_pixel(10, 10), &image::Rgb([9, 9, 9]));

        let csv = std::fs::read_to_string(&paths.scores).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("58,47.3000,"));
    }
}
