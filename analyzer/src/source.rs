use image::RgbImage;
use splash_common::{Frame, VideoInfo};

/// An ordered, finite, restartable sequence of decoded frames.
///
/// Implementations own whatever decoder resources they need and must release
/// them on drop, so a source going out of scope on any exit path closes it.
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// Position the source so the next frame returned is `index`.
    fn seek(&mut self, index: usize) -> Result<(), SourceError>;

    /// Decode the next frame, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Advance past one frame without handing it out. Returns `false` at end
    /// of stream. Sources that can skip cheaper than decoding override this.
    fn skip_frame(&mut self) -> Result<bool, SourceError> {
        Ok(self.next_frame()?.is_some())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn seek(&mut self, index: usize) -> Result<(), SourceError> {
        (**self).seek(index)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn skip_frame(&mut self) -> Result<bool, SourceError> {
        (**self).skip_frame()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open video {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("failed to probe video: {0}")]
    Probe(String),
    #[error("decode failed at frame {index}: {reason}")]
    Decode { index: usize, reason: String },
    #[error("seek to frame {index} out of range (frame count {frame_count})")]
    SeekOutOfRange { index: usize, frame_count: usize },
}

/// Frames held in memory. Used for synthetic streams and replays.
pub struct MemorySource {
    frames: Vec<RgbImage>,
    fps: f64,
    cursor: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            cursor: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> VideoInfo {
        let (width, height) = self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        VideoInfo {
            frame_count: self.frames.len(),
            fps: self.fps,
            width,
            height,
        }
    }

    fn seek(&mut self, index: usize) -> Result<(), SourceError> {
        if index > self.frames.len() {
            return Err(SourceError::SeekOutOfRange {
                index,
                frame_count: self.frames.len(),
            });
        }
        self.cursor = index;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(image) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        let frame = Frame::new(self.cursor, image.clone());
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn skip_frame(&mut self) -> Result<bool, SourceError> {
        if self.cursor >= self.frames.len() {
            return Ok(false);
        }
        self.cursor += 1;
        Ok(true)
    }
}

/// Lazy sequence `start, start + stride, ...` below `end`.
///
/// Cloning yields an independent iterator from the same position, and
/// [`SampledIndices::restart`] rewinds to `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledIndices {
    start: usize,
    end: usize,
    stride: usize,
    next: usize,
}

impl SampledIndices {
    /// A zero stride is treated as 1.
    pub fn new(start: usize, end: usize, stride: usize) -> Self {
        Self {
            start,
            end,
            stride: stride.max(1),
            next: start,
        }
    }

    pub fn restart(&mut self) {
        self.next = self.start;
    }

    pub fn peek(&self) -> Option<usize> {
        (self.next < self.end).then_some(self.next)
    }
}

impl Iterator for SampledIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.peek()?;
        self.next = current.saturating_add(self.stride);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next < self.end {
            (self.end - self.next).div_ceil(self.stride)
        } else {
            0
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SampledIndices {}
