use std::path::{Path, PathBuf};
use std::time::Instant;

use splash_analyzer::{
    write_report, FfmpegSource, FrameObserver, FrameSource, NoOracle, OverlayVideo, PeakLocator,
    ProcessOracle, ReportError, ReportPaths, SegmentationOracle, SourceError,
};
use splash_common::Config;
use splash_leaderboard::{
    AnyRecord, Leaderboard, LeaderboardEntry, LeaderboardError, LeaderboardOptions, RunLock,
    SubmitOutcome,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{Capture, LocalCapture, SshCapture};
use crate::error::PipelineError;
use crate::transfer::{LocalTransfer, ScpTransfer, Transfer};

pub type BoxedSource = Box<dyn FrameSource + Send>;
pub type BoxedOracle = Box<dyn SegmentationOracle + Send>;

/// Name the best frame is copied to before the leaderboard takes it over.
const THUMBNAIL_CANDIDATE: &str = "thumbnail_candidate.png";

/// What one successful run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub video: PathBuf,
    pub approx_peak_index: usize,
    pub best_index: usize,
    pub score: f64,
    pub report: ReportPaths,
    pub outcome: SubmitOutcome,
    pub leaderboard: Vec<LeaderboardEntry>,
}

struct Analysis {
    approx_peak_index: usize,
    best_index: usize,
    score: f64,
    report: ReportPaths,
}

/// A transferred clip nobody owns yet. Dropped without [`PendingClip::keep`],
/// the file is deleted.
struct PendingClip {
    path: PathBuf,
    armed: bool,
}

impl PendingClip {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The leaderboard has taken the file, either renamed or discarded.
    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PendingClip {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(video = %self.path.display(), "discarded clip of failed run"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(video = %self.path.display(), error = %e, "could not discard clip"),
        }
    }
}

/// Capture, transfer, analyze and rank one clip.
///
/// Runs hold a lock on the leaderboard directory for their whole duration.
/// Every failure before the leaderboard update leaves the record and its
/// artifacts untouched, and the transferred clip is deleted.
pub async fn run_pipeline<C, T, F, O>(
    config: &Config,
    capture: &C,
    transfer: &T,
    open_source: F,
    oracle: O,
) -> Result<RunSummary, PipelineError>
where
    C: Capture + Sync,
    T: Transfer + Sync,
    F: FnOnce(&Path) -> Result<BoxedSource, SourceError> + Send + 'static,
    O: SegmentationOracle + Send + 'static,
{
    let started = Instant::now();
    let _lock = RunLock::acquire(&config.leaderboard.dir).map_err(PipelineError::Lock)?;

    let clip = capture.capture().await?;
    let pending = PendingClip::new(transfer.fetch(&clip).await?);

    let analysis = {
        let config = config.clone();
        let video = pending.path().to_path_buf();
        tokio::task::spawn_blocking(move || analyze(&config, &video, open_source, oracle))
            .await
            .map_err(|e| PipelineError::Analysis(format!("analysis task failed: {e}")))??
    };

    let thumbnail = config.analysis.results_dir.join(THUMBNAIL_CANDIDATE);
    tokio::fs::copy(&analysis.report.best_frame, &thumbnail)
        .await
        .map_err(|e| {
            PipelineError::Artifact(ReportError::Write {
                path: thumbnail.display().to_string(),
                reason: e.to_string(),
            })
        })?;

    let (outcome, leaderboard) = {
        let leaderboard = config.leaderboard.clone();
        let video = pending.path().to_path_buf();
        let score = analysis.score;
        tokio::task::spawn_blocking(move || {
            let store = AnyRecord::open(&leaderboard)?;
            let mut board = Leaderboard::load(store, LeaderboardOptions::from_config(&leaderboard))?;
            let outcome = board.submit(score, &video, &thumbnail)?;
            board.persist()?;
            Ok::<_, LeaderboardError>((outcome, board.entries().to_vec()))
        })
        .await
        .map_err(|e| PipelineError::Analysis(format!("leaderboard task failed: {e}")))?
        .map_err(PipelineError::Persistence)?
    };
    let video = pending.keep();

    info!(
        video = %video.display(),
        best_frame = analysis.best_index,
        score = analysis.score,
        outcome = ?outcome,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );

    Ok(RunSummary {
        video,
        approx_peak_index: analysis.approx_peak_index,
        best_index: analysis.best_index,
        score: analysis.score,
        report: analysis.report,
        outcome,
        leaderboard,
    })
}

fn analyze<F, O>(
    config: &Config,
    video: &Path,
    open_source: F,
    mut oracle: O,
) -> Result<Analysis, PipelineError>
where
    F: FnOnce(&Path) -> Result<BoxedSource, SourceError>,
    O: SegmentationOracle,
{
    let mut source = open_source(video).map_err(|e| PipelineError::Analysis(e.to_string()))?;
    let locator = PeakLocator::from_config(config);
    let results_dir = &config.analysis.results_dir;
    info!(
        video = %video.display(),
        oracle = oracle.name(),
        frames = source.info().frame_count,
        "analysis started"
    );

    let mut overlay = if config.analysis.overlay_video {
        match OverlayVideo::start(results_dir, &source.info(), locator.roi()) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                warn!(error = %e, "overlay video disabled for this run");
                None
            }
        }
    } else {
        None
    };

    let result = locator.locate(
        &mut source,
        &mut oracle,
        overlay.as_mut().map(|o| o as &mut dyn FrameObserver),
    )?;

    let mut report = write_report(results_dir, &result, &locator.roi())?;
    report.overlay_video = overlay.and_then(OverlayVideo::finish);

    Ok(Analysis {
        approx_peak_index: result.approx_peak_index,
        best_index: result.best_index,
        score: result.best_score,
        report,
    })
}

/// Open a video with the ffmpeg decoder.
pub fn open_video(path: &Path) -> Result<BoxedSource, SourceError> {
    Ok(Box::new(FfmpegSource::open(path)?))
}

/// The configured segmentation helper, or color masks only when none is set
/// or it cannot be used.
pub fn build_oracle(config: &Config) -> BoxedOracle {
    match ProcessOracle::from_config(&config.oracle) {
        Ok(Some(oracle)) => Box::new(oracle),
        Ok(None) => Box::new(NoOracle),
        Err(e) => {
            warn!(error = %e, "segmentation helper unavailable, using color masks only");
            Box::new(NoOracle)
        }
    }
}

/// One run with the collaborators selected by `capture.mode`.
pub async fn run_once(config: &Config) -> Result<RunSummary, PipelineError> {
    let oracle = build_oracle(config);
    match config.capture.mode.as_str() {
        "local" => {
            let capture = LocalCapture::from_config(&config.capture)?;
            let transfer = LocalTransfer::from_config(&config.transfer);
            run_pipeline(config, &capture, &transfer, open_video, oracle).await
        }
        _ => {
            let capture = SshCapture::from_config(&config.capture);
            let transfer = ScpTransfer::from_config(&config.transfer);
            run_pipeline(config, &capture, &transfer, open_video, oracle).await
        }
    }
}

/// Run in the background. The returned handle resolves to the run's result.
pub fn spawn_run(config: Config) -> JoinHandle<Result<RunSummary, PipelineError>> {
    tokio::spawn(async move { run_once(&config).await })
}
