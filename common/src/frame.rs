use image::RgbImage;
use serde::Deserialize;

/// Static rectangle where splashes are expected. Pixels outside it never
/// contribute to a mask. Coordinates are half-open: `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RegionOfInterest {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl RegionOfInterest {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clip the box to a `width x height` raster. The result may be empty
    /// when the box lies entirely outside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// `x1,y1,x2,y2`, the form external helpers take on the command line.
    pub fn to_arg(&self) -> String {
        format!("{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Stream-level properties reported by a frame source before decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub frame_count: usize,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// A decoded frame and its position in the video.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let roi = RegionOfInterest::new(700, 200, 1000, 600);
        let clipped = roi.clamp_to(800, 480);
        assert_eq!(clipped, RegionOfInterest::new(700, 200, 800, 480));
        assert_eq!(clipped.width(), 100);
        assert_eq!(clipped.height(), 280);
    }

    #[test]
    fn box_outside_frame_is_empty() {
        let roi = RegionOfInterest::new(700, 200, 1000, 600);
        assert!(roi.clamp_to(640, 480).is_empty());
    }

    #[test]
    fn contains_is_half_open() {
        let roi = RegionOfInterest::new(2, 2, 4, 4);
        assert!(roi.contains(2, 2));
        assert!(roi.contains(3, 3));
        assert!(!roi.contains(4, 3));
        assert!(!roi.contains(3, 4));
    }

    #[test]
    fn arg_format() {
        assert_eq!(RegionOfInterest::new(1, 2, 3, 4).to_arg(), "1,2,3,4");
    }
}
