use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use image::{Rgb, RgbImage};
use splash_analyzer::{FrameSource, NoOracle, SourceError};
use splash_common::{Config, Frame, VideoInfo};
use splash_leaderboard::lock::LOCK_FILENAME;
use splash_leaderboard::{read_record, JsonRecord, RecordStore, RunLock, SubmitOutcome};
use splash_runner::{
    run_pipeline, BoxedSource, Capture, LocalCapture, LocalTransfer, PipelineError, RemoteClip,
};

const W: u32 = 1024;
const H: u32 = 640;
const WATER: Rgb<u8> = Rgb([20, 60, 120]);
// HSV (0, 30, 240): coarse profile.
const COARSE_FOAM: Rgb<u8> = Rgb([240, 212, 212]);
// HSV (0, 60, 240): fine profile.
const FINE_FOAM: Rgb<u8> = Rgb([240, 184, 184]);

/// Renders frames on demand so a full-size 150 frame clip never sits in
/// memory. The splash column grows toward `peak` and shrinks after it.
struct SyntheticClip {
    frames: usize,
    peak: usize,
    max_height: u32,
    cursor: usize,
}

impl SyntheticClip {
    fn new(frames: usize, peak: usize, max_height: u32) -> Self {
        Self {
            frames,
            peak,
            max_height,
            cursor: 0,
        }
    }

    fn render(&self, index: usize) -> RgbImage {
        let mut img = RgbImage::from_pixel(W, H, WATER);
        let dist = self.peak.abs_diff(index) as u32;
        let height = self.max_height.saturating_sub(20 * dist);
        // Columns stand on y = 580, inside the (700, 200, 1000, 600) ROI.
        for y in (580 - height)..580 {
            for x in 760..820 {
                img.put_pixel(x, y, COARSE_FOAM);
            }
            for x in 840..900 {
                img.put_pixel(x, y, FINE_FOAM);
            }
        }
        img
    }
}

impl FrameSource for SyntheticClip {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            frame_count: self.frames,
            fps: 30.0,
            width: W,
            height: H,
        }
    }

    fn seek(&mut self, index: usize) -> Result<(), SourceError> {
        if index > self.frames {
            return Err(SourceError::SeekOutOfRange {
                index,
                frame_count: self.frames,
            });
        }
        self.cursor = index;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.cursor >= self.frames {
            return Ok(None);
        }
        let frame = Frame::new(self.cursor, self.render(self.cursor));
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn skip_frame(&mut self) -> Result<bool, SourceError> {
        if self.cursor >= self.frames {
            return Ok(false);
        }
        self.cursor += 1;
        Ok(true)
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
    clip: PathBuf,
    config: Config,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let clip = root.join("camera.mp4");
        std::fs::write(&clip, b"not really h264").unwrap();

        let mut config = Config::default();
        config.capture.mode = "local".into();
        config.capture.local_video = Some(clip.clone());
        config.transfer.local_dir = root.join("videos");
        config.analysis.results_dir = root.join("results");
        config.analysis.overlay_video = false;
        config.leaderboard.dir = root.join("videos");
        config.validate().unwrap();

        Self {
            _dir: dir,
            root,
            clip,
            config,
        }
    }

    fn videos(&self) -> PathBuf {
        self.root.join("videos")
    }

    /// Transferred clips the leaderboard never took over.
    fn stray_clips(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.videos())
            .map(|dir| {
                dir.filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with("splash_"))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self) -> JsonRecord {
        JsonRecord::new(self.config.leaderboard.record_path())
    }

    async fn run(&self, peak: usize, max_height: u32) -> Result<splash_runner::RunSummary, PipelineError> {
        let capture = LocalCapture::new(&self.clip);
        self.run_with(&capture, peak, max_height).await
    }

    async fn run_with<C: Capture + Sync>(
        &self,
        capture: &C,
        peak: usize,
        max_height: u32,
    ) -> Result<splash_runner::RunSummary, PipelineError> {
        let transfer = LocalTransfer::from_config(&self.config.transfer);
        let open = move |_: &Path| -> Result<BoxedSource, SourceError> {
            Ok(Box::new(SyntheticClip::new(150, peak, max_height)))
        };
        run_pipeline(&self.config, capture, &transfer, open, NoOracle).await
    }
}

struct OfflineCamera {
    called: AtomicBool,
}

impl Capture for OfflineCamera {
    async fn capture(&self) -> Result<RemoteClip, PipelineError> {
        self.called.store(true, Ordering::SeqCst);
        Err(PipelineError::Capture("camera offline".into()))
    }
}

fn offline() -> OfflineCamera {
    OfflineCamera {
        called: AtomicBool::new(false),
    }
}

#[tokio::test]
async fn first_run_takes_rank_one() {
    let ws = Workspace::new();
    let summary = ws.run(58, 300).await.unwrap();

    // Stride 3 samples 57 and 60 around the peak; 57 is closer.
    assert_eq!(summary.approx_peak_index, 57);
    assert_eq!(summary.best_index, 58);
    assert!(summary.score > 0.0);
    assert_eq!(
        summary.outcome,
        SubmitOutcome::Ranked {
            rank: 1,
            evicted: 0
        }
    );

    let scores = std::fs::read_to_string(&summary.report.scores).unwrap();
    let rows: Vec<&str> = scores.lines().skip(1).collect();
    assert_eq!(rows.len(), 11);
    assert!(rows[0].starts_with("52,"));
    assert!(rows[10].starts_with("62,"));
    assert!(summary.report.best_frame.exists());
    assert!(summary.report.best_frame_with_mask.exists());
    assert!(summary.report.overlay_video.is_none());

    let entries = read_record(&ws.record()).unwrap();
    assert_eq!(entries, summary.leaderboard);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, summary.score);
    assert_eq!(entries[0].video, ws.videos().join("1_manu.mp4"));
    assert_eq!(entries[0].thumbnail, ws.videos().join("1_manu.png"));
    assert_eq!(
        std::fs::read(&entries[0].video).unwrap(),
        b"not really h264"
    );
    assert_eq!(
        image::open(&entries[0].thumbnail).unwrap().to_rgb8(),
        image::open(&summary.report.best_frame).unwrap().to_rgb8()
    );

    assert!(ws.clip.exists());
    assert!(!ws.videos().join(LOCK_FILENAME).exists());
}

#[tokio::test]
async fn runs_accumulate_into_ranked_top_three() {
    let ws = Workspace::new();
    let mut scores = Vec::new();
    for height in [200, 300, 100] {
        scores.push(ws.run(70, height).await.unwrap().score);
    }
    assert!(scores[1] > scores[0] && scores[0] > scores[2]);

    let entries = read_record(&ws.record()).unwrap();
    let ranked: Vec<f64> = entries.iter().map(|e| e.score).collect();
    assert_eq!(ranked, vec![scores[1], scores[0], scores[2]]);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.video, ws.videos().join(format!("{}_manu.mp4", i + 1)));
        assert_eq!(entry.thumbnail, ws.videos().join(format!("{}_manu.png", i + 1)));
        assert!(entry.artifacts_exist());
    }

    // A weaker attempt does not place and leaves nothing behind.
    let weak = ws.run(70, 50).await.unwrap();
    assert_eq!(weak.outcome, SubmitOutcome::Dropped);
    assert!(!weak.video.exists());
    assert_eq!(read_record(&ws.record()).unwrap(), entries);
    let mp4s = std::fs::read_dir(ws.videos())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "mp4"))
        .count();
    assert_eq!(mp4s, 3);
    assert!(ws.stray_clips().is_empty());
}

#[tokio::test]
async fn capture_failure_leaves_leaderboard_untouched() {
    let ws = Workspace::new();
    ws.run(40, 250).await.unwrap();
    let before = std::fs::read(ws.record().location()).unwrap();

    let camera = offline();
    let err = ws.run_with(&camera, 40, 300).await.unwrap_err();
    assert!(matches!(err, PipelineError::Capture(_)));

    assert_eq!(std::fs::read(ws.record().location()).unwrap(), before);
    assert!(ws.videos().join("1_manu.mp4").exists());
    assert!(!ws.videos().join("2_manu.mp4").exists());
    assert!(!ws.videos().join(LOCK_FILENAME).exists());
}

#[tokio::test]
async fn analysis_failure_leaves_leaderboard_untouched() {
    let ws = Workspace::new();
    ws.run(40, 250).await.unwrap();
    let before = std::fs::read(ws.record().location()).unwrap();

    let transfer = LocalTransfer::from_config(&ws.config.transfer);
    let broken = |path: &Path| -> Result<BoxedSource, SourceError> {
        Err(SourceError::Open {
            path: path.display().to_string(),
            reason: "moov atom not found".into(),
        })
    };
    let err = run_pipeline(
        &ws.config,
        &LocalCapture::new(&ws.clip),
        &transfer,
        broken,
        NoOracle,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Analysis(_)));

    assert_eq!(std::fs::read(ws.record().location()).unwrap(), before);
    let entries = read_record(&ws.record()).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].artifacts_exist());
    assert!(ws.stray_clips().is_empty());
}

#[tokio::test]
async fn empty_clip_is_reported() {
    let ws = Workspace::new();
    let transfer = LocalTransfer::from_config(&ws.config.transfer);
    let empty = |_: &Path| -> Result<BoxedSource, SourceError> {
        Ok(Box::new(SyntheticClip::new(0, 0, 0)))
    };
    let err = run_pipeline(
        &ws.config,
        &LocalCapture::new(&ws.clip),
        &transfer,
        empty,
        NoOracle,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult(_)));
    assert!(read_record(&ws.record()).unwrap().is_empty());
    assert!(ws.stray_clips().is_empty());
    assert!(ws.clip.exists());
}

#[tokio::test]
async fn concurrent_run_is_refused_before_capture() {
    let ws = Workspace::new();
    let _held = RunLock::acquire(&ws.videos()).unwrap();

    let camera = offline();
    let err = ws.run_with(&camera, 40, 300).await.unwrap_err();
    assert!(matches!(err, PipelineError::Lock(_)));
    assert!(!camera.called.load(Ordering::SeqCst));
}
