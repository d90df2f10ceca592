use splash_common::config::ScoringConfig;

use crate::measure::SplashMetrics;

pub const MAX_SCORE: f64 = 100.0;

/// Weighted, ceiling-normalized splash score.
///
/// Each metric is normalized as `min(value / ceiling, 1) * 100` and the score
/// is the weighted sum, clamped to 100. Masks below the `min_area` noise
/// floor score 0 regardless of their height, which rejects tall-but-empty
/// false detections.
#[derive(Debug, Clone)]
pub struct ScoreModel {
    min_area: u64,
    area_max: f64,
    hull_max: f64,
    height_max: f64,
    weight_height: f64,
    weight_area: f64,
    weight_hull: f64,
}

impl ScoreModel {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            min_area: config.min_area,
            area_max: config.area_max,
            hull_max: config.hull_max,
            height_max: config.height_max,
            weight_height: config.weight_height,
            weight_area: config.weight_area,
            weight_hull: config.weight_hull,
        }
    }

    pub fn min_area(&self) -> u64 {
        self.min_area
    }

    pub fn score(&self, metrics: &SplashMetrics) -> f64 {
        if metrics.area < self.min_area {
            return 0.0;
        }
        let h = normalize(metrics.height as f64, self.height_max);
        let a = normalize(metrics.area as f64, self.area_max);
        let c = normalize(metrics.hull_area as f64, self.hull_max);

        let score = self.weight_height * h + self.weight_area * a + self.weight_hull * c;
        score.clamp(0.0, MAX_SCORE)
    }
}

fn normalize(value: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 {
        return 0.0;
    }
    (value / ceiling).min(1.0) * MAX_SCORE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ScoreModel {
        ScoreModel::new(&ScoringConfig::default())
    }

    fn metrics(area: u64, hull_area: u64, height: u32) -> SplashMetrics {
        SplashMetrics {
            area,
            hull_area,
            height,
            width: 0,
        }
    }

    #[test]
    fn below_noise_floor_scores_zero_even_at_max_height() {
        let m = model();
        assert_eq!(m.score(&metrics(99, 100_000, 400)), 0.0);
        assert_eq!(m.score(&metrics(0, 0, 10_000)), 0.0);
    }

    #[test]
    fn saturated_metrics_score_exactly_one_hundred() {
        let m = model();
        let s = m.score(&metrics(1_000_000, 10_000_000, 5_000));
        assert!((s - 100.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_sum_of_normalized_metrics() {
        let m = model();
        // H = 50, A = 10, C = 2  ->  0.6*50 + 0.35*10 + 0.05*2 = 33.6
        let s = m.score(&metrics(1_000, 2_000, 200));
        assert!((s - 33.6).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn height_dominates() {
        let m = model();
        let tall = m.score(&metrics(1_000, 1_000, 400));
        let wide = m.score(&metrics(10_000, 1_000, 40));
        assert!(tall > wide);
    }

    #[test]
    fn weights_are_configuration() {
        let config = ScoringConfig {
            weight_height: 0.0,
            weight_area: 1.0,
            weight_hull: 0.0,
            ..ScoringConfig::default()
        };
        let m = ScoreModel::new(&config);
        assert!((m.score(&metrics(5_000, 0, 400)) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn score_always_in_range() {
        let m = model();
        for area in [0u64, 50, 100, 5_000, 10_000, u32::MAX as u64] {
            for hull in [0u64, 1, 100_000, u64::MAX / 2] {
                for height in [0u32, 1, 400, u32::MAX] {
                    let s = m.score(&metrics(area, hull, height));
                    assert!((0.0..=100.0).contains(&s), "{s} out of range");
                }
            }
        }
    }
}
