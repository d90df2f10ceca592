use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use tracing::trace;

use crate::mask::SplashMask;

/// Geometric measurements of one splash mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplashMetrics {
    /// Splash pixel count.
    pub area: u64,
    /// Area of the convex hull around every external contour.
    pub hull_area: u64,
    /// `max_y - min_y` over splash pixels, 0 for an empty mask.
    pub height: u32,
    /// `max_x - min_x` over splash pixels, 0 for an empty mask.
    pub width: u32,
}

/// Measure a mask.
///
/// Disjoint droplets are scored as one combined splash: the points of all
/// external contours are merged and a single hull is taken over the union.
pub fn measure(mask: &SplashMask) -> SplashMetrics {
    let mut area = 0u64;
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y) in mask.on_pixels() {
        area += 1;
        bounds = Some(match bounds {
            None => (x, x, y, y),
            Some((min_x, max_x, min_y, max_y)) => {
                (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
            }
        });
    }

    let Some((min_x, max_x, min_y, max_y)) = bounds else {
        return SplashMetrics::default();
    };

    SplashMetrics {
        area,
        hull_area: hull_area(mask),
        height: max_y - min_y,
        width: max_x - min_x,
    }
}

fn hull_area(mask: &SplashMask) -> u64 {
    let contours = find_contours::<i32>(mask.as_gray());
    let external: Vec<_> = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .collect();

    let points: Vec<Point<i32>> = match external.len() {
        0 => return 0,
        1 => external[0].points.clone(),
        _ => external.iter().flat_map(|c| c.points.iter().copied()).collect(),
    };
    trace!(contours = external.len(), points = points.len(), "hull input");

    let hull = convex_hull(points.as_slice());
    polygon_area(&hull).floor() as u64
}

/// Shoelace area of a closed polygon, always non-negative.
pub fn polygon_area(vertices: &[Point<i32>]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, a) in vertices.iter().enumerate() {
        let b = &vertices[(i + 1) % vertices.len()];
        twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    twice.abs() as f64 / 2.0
}
