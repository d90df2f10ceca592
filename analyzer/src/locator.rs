use image::RgbImage;
use splash_common::{Config, RegionOfInterest};
use tracing::{debug, info, warn};

use crate::mask::{combine, MaskBuilder, Profile, SplashMask};
use crate::measure::{measure, SplashMetrics};
use crate::oracle::SegmentationOracle;
use crate::score::ScoreModel;
use crate::source::{FrameSource, SampledIndices, SourceError};

/// One row of the pass-2 diagnostic log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
    pub frame_index: usize,
    pub score: f64,
    pub metrics: SplashMetrics,
}

/// Outcome of a full two-pass run.
#[derive(Debug, Clone)]
pub struct LocatorResult {
    pub approx_peak_index: usize,
    pub approx_peak_score: f64,
    /// Frames scored in pass 1.
    pub sampled: usize,
    pub best_index: usize,
    pub best_score: f64,
    pub best_metrics: SplashMetrics,
    pub best_frame: RgbImage,
    pub best_mask: SplashMask,
    /// Every pass-2 frame in window order.
    pub log: Vec<ScoreRecord>,
}

/// Receives each pass-2 frame after it has been scored.
///
/// Frames are lent, so observers that draw must work on their own copy.
pub trait FrameObserver {
    fn observe(
        &mut self,
        frame: &RgbImage,
        mask: &SplashMask,
        record: &ScoreRecord,
        is_peak: bool,
    );
}

#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("video has no frames")]
    EmptyVideo,
    #[error("no frame in window {start}..{end} could be scored")]
    NoScore { start: usize, end: usize },
}

/// Finds the peak-splash frame of a video in two passes: a strided coarse
/// scan without the oracle, then an exhaustive refined scan of a small
/// window around the coarse peak.
#[derive(Debug, Clone)]
pub struct PeakLocator {
    masks: MaskBuilder,
    model: ScoreModel,
    stride: usize,
    refine_range: usize,
}

impl PeakLocator {
    pub fn new(masks: MaskBuilder, model: ScoreModel, stride: usize, refine_range: usize) -> Self {
        Self {
            masks,
            model,
            stride: stride.max(1),
            refine_range,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MaskBuilder::from_config(config),
            ScoreModel::new(&config.scoring),
            config.analysis.stride,
            config.analysis.refine_range,
        )
    }

    pub fn roi(&self) -> RegionOfInterest {
        self.masks.roi()
    }

    pub fn locate<S, O>(
        &self,
        source: &mut S,
        oracle: &mut O,
        mut observer: Option<&mut dyn FrameObserver>,
    ) -> Result<LocatorResult, LocatorError>
    where
        S: FrameSource + ?Sized,
        O: SegmentationOracle + ?Sized,
    {
        let coarse = self.coarse_pass(source)?;
        let (start, end) = self.window(coarse.index, source.info().frame_count);
        info!(
            approx_peak = coarse.index,
            approx_score = coarse.score,
            sampled = coarse.sampled,
            window_start = start,
            window_end = end,
            "pass 1 complete"
        );

        let refined = self.refine_pass(source, oracle, start, end, &mut observer)?;
        info!(
            best_frame = refined.index,
            best_score = refined.score,
            scanned = refined.log.len(),
            "pass 2 complete"
        );

        Ok(LocatorResult {
            approx_peak_index: coarse.index,
            approx_peak_score: coarse.score,
            sampled: coarse.sampled,
            best_index: refined.index,
            best_score: refined.score,
            best_metrics: refined.metrics,
            best_frame: refined.frame,
            best_mask: refined.mask,
            log: refined.log,
        })
    }

    /// Refinement window `[peak - R, peak + R]` clipped to `[0, frame_count)`,
    /// returned half-open.
    pub fn window(&self, peak: usize, frame_count: usize) -> (usize, usize) {
        let start = peak.saturating_sub(self.refine_range);
        let end = peak
            .saturating_add(self.refine_range)
            .saturating_add(1)
            .min(frame_count);
        (start, end.max(start))
    }

    fn coarse_pass<S>(&self, source: &mut S) -> Result<CoarsePeak, LocatorError>
    where
        S: FrameSource + ?Sized,
    {
        let frame_count = source.info().frame_count;
        if frame_count == 0 {
            return Err(LocatorError::EmptyVideo);
        }
        source.seek(0)?;

        let mut position = 0usize;
        let mut best: Option<CoarsePeak> = None;
        let mut sampled = 0usize;

        'samples: for index in SampledIndices::new(0, frame_count, self.stride) {
            while position < index {
                if !source.skip_frame()? {
                    break 'samples;
                }
                position += 1;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            position += 1;
            sampled += 1;

            let mask = self.masks.build(&frame.image, Profile::Coarse);
            let metrics = measure(&mask);
            let score = self.model.score(&metrics);
            debug!(frame = index, score, area = metrics.area, "pass 1 sample");

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(CoarsePeak {
                    index,
                    score,
                    sampled: 0,
                });
            }
        }

        let mut peak = best.ok_or(LocatorError::EmptyVideo)?;
        peak.sampled = sampled;
        Ok(peak)
    }

    fn refine_pass<S, O>(
        &self,
        source: &mut S,
        oracle: &mut O,
        start: usize,
        end: usize,
        observer: &mut Option<&mut dyn FrameObserver>,
    ) -> Result<RefinedPeak, LocatorError>
    where
        S: FrameSource + ?Sized,
        O: SegmentationOracle + ?Sized,
    {
        source.seek(start)?;
        let roi = self.masks.roi();

        let mut log = Vec::with_capacity(end - start);
        let mut best: Option<RefinedPeak> = None;

        for index in start..end {
            let Some(frame) = source.next_frame()? else {
                warn!(frame = index, "video ended inside refinement window");
                break;
            };

            let color = self.masks.build(&frame.image, Profile::Fine);
            let mask = match oracle.predict(&frame.image, &roi) {
                Ok(Some(prediction)) => {
                    debug!(frame = index, confidence = prediction.confidence, "oracle mask");
                    combine(&color, Some(&prediction.mask))
                }
                Ok(None) => color,
                Err(e) => {
                    warn!(frame = index, error = %e, "oracle failed, using color mask");
                    color
                }
            };

            let metrics = measure(&mask);
            let score = self.model.score(&metrics);
            let record = ScoreRecord {
                frame_index: index,
                score,
                metrics,
            };
            log.push(record);
            debug!(
                frame = index,
                score,
                area = metrics.area,
                hull_area = metrics.hull_area,
                height = metrics.height,
                "pass 2 frame"
            );

            let is_peak = best.as_ref().map_or(true, |b| score > b.score);
            if let Some(obs) = observer.as_deref_mut() {
                obs.observe(&frame.image, &mask, &record, is_peak);
            }
            if is_peak {
                best = Some(RefinedPeak {
                    index,
                    score,
                    metrics,
                    frame: frame.image,
                    mask,
                    log: Vec::new(),
                });
            }
        }

        let mut peak = best.ok_or(LocatorError::NoScore { start, end })?;
        peak.log = log;
        Ok(peak)
    }
}

struct CoarsePeak {
    index: usize,
    score: f64,
    sampled: usize,
}

struct RefinedPeak {
    index: usize,
    score: f64,
    metrics: SplashMetrics,
    frame: RgbImage,
    mask: SplashMask,
    log: Vec<ScoreRecord>,
}
