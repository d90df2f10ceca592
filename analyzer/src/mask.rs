use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use splash_common::{Config, RegionOfInterest, ThresholdProfile};
use tracing::debug;

const ON: u8 = 255;

/// Binary splash mask with the same dimensions as its source frame.
///
/// Stored as a grayscale raster holding only 0 or 255 so it can be handed to
/// `imageproc` routines and blended into overlays without conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SplashMask {
    pixels: GrayImage,
}

impl SplashMask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    /// Any non-zero pixel counts as splash.
    pub fn from_gray(mut pixels: GrayImage) -> Self {
        for p in pixels.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = ON;
            }
        }
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y).0[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.pixels.put_pixel(x, y, Luma([if on { ON } else { 0 }]));
    }

    /// Number of splash pixels.
    pub fn count(&self) -> u64 {
        self.pixels.pixels().filter(|p| p.0[0] != 0).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[0] == 0)
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    /// Iterate `(x, y)` of every splash pixel in row-major order.
    pub fn on_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pixels
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] != 0)
            .map(|(x, y, _)| (x, y))
    }

    /// Logical AND. Both masks must share dimensions.
    pub fn intersect(&self, other: &SplashMask) -> SplashMask {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let mut out = self.pixels.clone();
        for (dst, src) in out.pixels_mut().zip(other.pixels.pixels()) {
            if src.0[0] == 0 {
                dst.0[0] = 0;
            }
        }
        SplashMask { pixels: out }
    }
}

/// Which threshold profile a mask is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Pass 1: color threshold only, no noise suppression.
    Coarse,
    /// Pass 2: color threshold, then blobs under `min_area` pixels removed.
    Fine,
}

/// Builds ROI-confined candidate masks from a color classification.
#[derive(Debug, Clone)]
pub struct MaskBuilder {
    roi: RegionOfInterest,
    coarse: ThresholdProfile,
    fine: ThresholdProfile,
    min_area: u64,
}

impl MaskBuilder {
    pub fn new(
        roi: RegionOfInterest,
        coarse: ThresholdProfile,
        fine: ThresholdProfile,
        min_area: u64,
    ) -> Self {
        Self {
            roi,
            coarse,
            fine,
            min_area,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.analysis.roi,
            config.analysis.coarse,
            config.analysis.fine,
            config.scoring.min_area,
        )
    }

    pub fn roi(&self) -> RegionOfInterest {
        self.roi
    }

    pub fn build(&self, image: &RgbImage, profile: Profile) -> SplashMask {
        match profile {
            Profile::Coarse => color_mask(image, &self.roi, &self.coarse),
            Profile::Fine => {
                let raw = color_mask(image, &self.roi, &self.fine);
                remove_small_components(&raw, self.min_area)
            }
        }
    }
}

/// Classify pixels inside the ROI whose HSV falls within `profile`.
/// Everything outside the ROI is zero.
pub fn color_mask(image: &RgbImage, roi: &RegionOfInterest, profile: &ThresholdProfile) -> SplashMask {
    let (width, height) = image.dimensions();
    let mut mask = SplashMask::empty(width, height);
    let roi = roi.clamp_to(width, height);
    if roi.is_empty() {
        return mask;
    }

    for y in roi.y1..roi.y2 {
        for x in roi.x1..roi.x2 {
            let [r, g, b] = image.get_pixel(x, y).0;
            let (h, s, v) = rgb_to_hsv(r, g, b);
            if within(h, profile.hue) && within(s, profile.saturation) && within(v, profile.value) {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

fn within(v: u8, [lo, hi]: [u8; 2]) -> bool {
    v >= lo && v <= hi
}

/// 8-bit HSV with hue halved into 0..=180, saturation and value in 0..=255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    ((h / 2.0).round().min(180.0) as u8, s.round() as u8, max as u8)
}

/// Drop 8-connected components with fewer than `min_area` pixels.
pub fn remove_small_components(mask: &SplashMask, min_area: u64) -> SplashMask {
    if min_area <= 1 {
        return mask.clone();
    }
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut sizes = vec![0u64; max_label + 1];
    for p in labels.pixels() {
        sizes[p.0[0] as usize] += 1;
    }

    let (width, height) = mask.dimensions();
    let mut out = SplashMask::empty(width, height);
    let mut kept = 0usize;
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p.0[0] as usize;
        if label != 0 && sizes[label] >= min_area {
            out.set(x, y, true);
            kept += 1;
        }
    }
    debug!(
        components = max_label,
        kept_pixels = kept,
        min_area,
        "noise suppression"
    );
    out
}

/// Final pass-2 mask: the oracle mask intersected with the color mask, or the
/// color mask alone when the oracle had nothing to offer.
pub fn combine(color: &SplashMask, oracle: Option<&SplashMask>) -> SplashMask {
    match oracle {
        Some(refined) if refined.dimensions() == color.dimensions() => color.intersect(refined),
        _ => color.clone(),
    }
}
