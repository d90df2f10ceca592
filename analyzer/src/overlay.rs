use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use splash_common::RegionOfInterest;

use crate::mask::SplashMask;
use crate::score::MAX_SCORE;

const ROI_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PEAK_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BAR_BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);
const BAR_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const ROI_THICKNESS: u32 = 3;
const PEAK_THICKNESS: u32 = 6;
const BAR_MARGIN: u32 = 10;
const BAR_HEIGHT: u32 = 12;
const BAR_MAX_WIDTH: u32 = 200;

/// Annotate a copy of `frame`: red mask tint, green ROI box, a bar for the
/// live score and a yellow border when the frame is the running peak.
pub fn annotate(
    frame: &RgbImage,
    mask: &SplashMask,
    roi: &RegionOfInterest,
    score: f64,
    is_peak: bool,
) -> RgbImage {
    let mut out = frame.clone();
    tint_mask(&mut out, mask);
    draw_roi(&mut out, roi);
    draw_score_bar(&mut out, score);
    if is_peak {
        draw_border(&mut out, PEAK_COLOR, PEAK_THICKNESS);
    }
    out
}

/// 50% blend of every mask pixel toward pure red.
pub fn tint_mask(image: &mut RgbImage, mask: &SplashMask) {
    if mask.dimensions() != image.dimensions() {
        return;
    }
    for (x, y) in mask.on_pixels() {
        let p = image.get_pixel_mut(x, y);
        let [r, g, b] = p.0;
        *p = Rgb([
            ((r as u16 + 255) / 2) as u8,
            (g / 2),
            (b / 2),
        ]);
    }
}

fn draw_roi(image: &mut RgbImage, roi: &RegionOfInterest) {
    let roi = roi.clamp_to(image.width(), image.height());
    for inset in 0..ROI_THICKNESS {
        let w = roi.width().saturating_sub(2 * inset);
        let h = roi.height().saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((roi.x1 + inset) as i32, (roi.y1 + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, ROI_COLOR);
    }
}

fn draw_score_bar(image: &mut RgbImage, score: f64) {
    let track = BAR_MAX_WIDTH.min(image.width().saturating_sub(2 * BAR_MARGIN));
    if track == 0 || image.height() < BAR_MARGIN + BAR_HEIGHT {
        return;
    }
    let origin = (BAR_MARGIN as i32, BAR_MARGIN as i32);
    draw_filled_rect_mut(
        image,
        Rect::at(origin.0, origin.1).of_size(track, BAR_HEIGHT),
        BAR_BACKGROUND,
    );

    let fill = ((score.clamp(0.0, MAX_SCORE) / MAX_SCORE) * track as f64).round() as u32;
    if fill > 0 {
        draw_filled_rect_mut(
            image,
            Rect::at(origin.0, origin.1).of_size(fill, BAR_HEIGHT),
            BAR_COLOR,
        );
    }
}

fn draw_border(image: &mut RgbImage, color: Rgb<u8>, thickness: u32) {
    let (width, height) = image.dimensions();
    for inset in 0..thickness {
        let w = width.saturating_sub(2 * inset);
        let h = height.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        draw_hollow_rect_mut(image, Rect::at(inset as i32, inset as i32).of_size(w, h), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_leaves_source_untouched() {
        let frame = RgbImage::from_pixel(80, 60, Rgb([10, 20, 30]));
        let mut mask = SplashMask::empty(80, 60);
        mask.set(40, 40, true);
        let roi = RegionOfInterest::new(20, 20, 60, 50);

        let annotated = annotate(&frame, &mask, &roi, 50.0, true);
        assert_eq!(frame.get_pixel(40, 40), &Rgb([10, 20, 30]));
        assert_ne!(annotated, frame);
    }

    #[test]
    fn mask_pixels_are_tinted_red() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let mut mask = SplashMask::empty(8, 8);
        mask.set(2, 3, true);
        tint_mask(&mut img, &mask);
        assert_eq!(img.get_pixel(2, 3), &Rgb([177, 50, 50]));
        assert_eq!(img.get_pixel(0, 0), &Rgb([100, 100, 100]));
    }

    #[test]
    fn roi_outline_is_green() {
        let frame = RgbImage::new(80, 60);
        let roi = RegionOfInterest::new(20, 30, 60, 50);
        let out = annotate(&frame, &SplashMask::empty(80, 60), &roi, 0.0, false);
        assert_eq!(out.get_pixel(20, 40), &ROI_COLOR);
        assert_eq!(out.get_pixel(22, 40), &ROI_COLOR);
        assert_eq!(out.get_pixel(40, 40), &Rgb([0, 0, 0]));
    }

    #[test]
    fn peak_marker_only_on_peak() {
        let frame = RgbImage::new(80, 60);
        let roi = RegionOfInterest::new(20, 30, 60, 50);
        let mask = SplashMask::empty(80, 60);
        let peak = annotate(&frame, &mask, &roi, 0.0, true);
        let plain = annotate(&frame, &mask, &roi, 0.0, false);
        assert_eq!(peak.get_pixel(79, 59), &PEAK_COLOR);
        assert_eq!(plain.get_pixel(79, 59), &Rgb([0, 0, 0]));
    }

    #[test]
    fn score_bar_scales_with_score() {
        let frame = RgbImage::new(300, 60);
        let roi = RegionOfInterest::new(0, 0, 1, 1);
        let mask = SplashMask::empty(300, 60);
        let half = annotate(&frame, &mask, &roi, 50.0, false);
        let y = BAR_MARGIN + 2;
        assert_eq!(half.get_pixel(BAR_MARGIN + 99, y), &BAR_COLOR);
        assert_eq!(half.get_pixel(BAR_MARGIN + 101, y), &BAR_BACKGROUND);
    }

    #[test]
    fn tiny_frames_do_not_panic() {
        let frame = RgbImage::new(3, 3);
        let roi = RegionOfInterest::new(0, 0, 3, 3);
        let _ = annotate(&frame, &SplashMask::empty(3, 3), &roi, 100.0, true);
    }
}
