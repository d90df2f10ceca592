use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::RegionOfInterest;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// `"ssh"` records on the camera host, `"local"` uses `local_video` as-is.
    #[serde(default = "default_capture_mode")]
    pub mode: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    /// V4L2 device on the camera host.
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub local_video: Option<PathBuf>,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_transfer_timeout")]
    pub timeout_secs: u64,
}

/// HSV bounds on the 0-180 / 0-255 / 0-255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdProfile {
    pub hue: [u8; 2],
    pub saturation: [u8; 2],
    pub value: [u8; 2],
}

impl ThresholdProfile {
    /// Pass 1: very bright, nearly unsaturated pixels only.
    pub fn coarse() -> Self {
        Self {
            hue: [0, 180],
            saturation: [20, 40],
            value: [220, 255],
        }
    }

    /// Pass 2: wider value band, followed by small-blob removal.
    pub fn fine() -> Self {
        Self {
            hue: [0, 180],
            saturation: [40, 80],
            value: [135, 255],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_roi")]
    pub roi: RegionOfInterest,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default = "default_refine_range")]
    pub refine_range: usize,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_true")]
    pub overlay_video: bool,
    #[serde(default = "ThresholdProfile::coarse")]
    pub coarse: ThresholdProfile,
    #[serde(default = "ThresholdProfile::fine")]
    pub fine: ThresholdProfile,
}

/// Calibration for the splash score. Weights and ceilings are tuned per camera
/// placement, so none of them are baked into the scoring code.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_min_area")]
    pub min_area: u64,
    #[serde(default = "default_area_max")]
    pub area_max: f64,
    #[serde(default = "default_hull_max")]
    pub hull_max: f64,
    #[serde(default = "default_height_max")]
    pub height_max: f64,
    #[serde(default = "default_weight_height")]
    pub weight_height: f64,
    #[serde(default = "default_weight_area")]
    pub weight_area: f64,
    #[serde(default = "default_weight_hull")]
    pub weight_hull: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleConfig {
    /// External segmentation helper. `None` runs pass 2 on the color mask alone.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_leaderboard_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_record")]
    pub record: String,
    /// `"json"` or `"sqlite"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_artifact_stem")]
    pub artifact_stem: String,
    #[serde(default = "default_rename_attempts")]
    pub rename_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: default_capture_mode(),
            user: String::new(),
            host: String::new(),
            remote_path: default_remote_path(),
            device: default_device(),
            local_video: None,
            duration_secs: default_duration_secs(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            timeout_secs: default_capture_timeout(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            timeout_secs: default_transfer_timeout(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            roi: default_roi(),
            stride: default_stride(),
            refine_range: default_refine_range(),
            results_dir: default_results_dir(),
            overlay_video: true,
            coarse: ThresholdProfile::coarse(),
            fine: ThresholdProfile::fine(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            area_max: default_area_max(),
            hull_max: default_hull_max(),
            height_max: default_height_max(),
            weight_height: default_weight_height(),
            weight_area: default_weight_area(),
            weight_hull: default_weight_hull(),
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            dir: default_leaderboard_dir(),
            record: default_record(),
            backend: default_backend(),
            capacity: default_capacity(),
            artifact_stem: default_artifact_stem(),
            rename_attempts: default_rename_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            transfer: TransferConfig::default(),
            analysis: AnalysisConfig::default(),
            scoring: ScoringConfig::default(),
            oracle: OracleConfig {
                command: None,
                timeout_secs: default_oracle_timeout(),
            },
            leaderboard: LeaderboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LeaderboardConfig {
    pub fn record_path(&self) -> PathBuf {
        self.dir.join(&self.record)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let roi = &self.analysis.roi;
        if roi.x1 >= roi.x2 || roi.y1 >= roi.y2 {
            return Err(ConfigError::Invalid(format!(
                "roi must satisfy x1 < x2 and y1 < y2, got ({}, {}, {}, {})",
                roi.x1, roi.y1, roi.x2, roi.y2
            )));
        }
        if self.analysis.stride == 0 {
            return Err(ConfigError::Invalid("analysis.stride must be at least 1".into()));
        }
        for (name, profile) in [("coarse", &self.analysis.coarse), ("fine", &self.analysis.fine)] {
            let ranges = [profile.hue, profile.saturation, profile.value];
            if ranges.iter().any(|[lo, hi]| lo > hi) || profile.hue[1] > 180 {
                return Err(ConfigError::Invalid(format!(
                    "analysis.{name} has an empty or out-of-scale range"
                )));
            }
        }

        let s = &self.scoring;
        for (name, ceiling) in [
            ("area_max", s.area_max),
            ("hull_max", s.hull_max),
            ("height_max", s.height_max),
        ] {
            if !(ceiling.is_finite() && ceiling > 0.0) {
                return Err(ConfigError::Invalid(format!("scoring.{name} must be > 0")));
            }
        }
        let weights = [s.weight_height, s.weight_area, s.weight_hull];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid("scoring weights must be non-negative".into()));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "scoring weights must sum to 1, got {sum}"
            )));
        }

        if self.leaderboard.capacity == 0 {
            return Err(ConfigError::Invalid("leaderboard.capacity must be at least 1".into()));
        }
        match self.leaderboard.backend.as_str() {
            "json" | "sqlite" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown leaderboard backend '{other}', expected 'json' or 'sqlite'"
                )))
            }
        }
        match self.capture.mode.as_str() {
            "ssh" => {
                if self.capture.host.is_empty() || self.capture.user.is_empty() {
                    return Err(ConfigError::Invalid(
                        "capture.mode = 'ssh' requires capture.user and capture.host".into(),
                    ));
                }
            }
            "local" => {
                if self.capture.local_video.is_none() {
                    return Err(ConfigError::Invalid(
                        "capture.mode = 'local' requires capture.local_video".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown capture mode '{other}', expected 'ssh' or 'local'"
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_capture_mode() -> String {
    "ssh".into()
}
fn default_remote_path() -> String {
    "/home/pi/splash.mp4".into()
}
fn default_device() -> String {
    "/dev/video0".into()
}
fn default_duration_secs() -> u64 {
    5
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_fps() -> u32 {
    30
}
fn default_capture_timeout() -> u64 {
    60
}
fn default_local_dir() -> PathBuf {
    PathBuf::from("videos")
}
fn default_transfer_timeout() -> u64 {
    120
}
fn default_roi() -> RegionOfInterest {
    RegionOfInterest {
        x1: 700,
        y1: 200,
        x2: 1000,
        y2: 600,
    }
}
fn default_stride() -> usize {
    3
}
fn default_refine_range() -> usize {
    5
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_true() -> bool {
    true
}
fn default_min_area() -> u64 {
    100
}
fn default_area_max() -> f64 {
    10_000.0
}
fn default_hull_max() -> f64 {
    100_000.0
}
fn default_height_max() -> f64 {
    400.0
}
fn default_weight_height() -> f64 {
    0.6
}
fn default_weight_area() -> f64 {
    0.35
}
fn default_weight_hull() -> f64 {
    0.05
}
fn default_oracle_timeout() -> u64 {
    30
}
fn default_leaderboard_dir() -> PathBuf {
    PathBuf::from("videos")
}
fn default_record() -> String {
    "leaderboard.json".into()
}
fn default_backend() -> String {
    "json".into()
}
fn default_capacity() -> usize {
    3
}
fn default_artifact_stem() -> String {
    "manu".into()
}
fn default_rename_attempts() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = r#"
        [capture]
        mode = "local"
        local_video = "clip.mp4"
    "#;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = Config::from_toml(LOCAL).unwrap();
        assert_eq!(config.analysis.stride, 3);
        assert_eq!(config.analysis.refine_range, 5);
        assert_eq!(config.analysis.roi.x1, 700);
        assert_eq!(config.analysis.coarse, ThresholdProfile::coarse());
        assert_eq!(config.scoring.min_area, 100);
        assert_eq!(config.leaderboard.capacity, 3);
        assert_eq!(config.leaderboard.record_path(), PathBuf::from("videos/leaderboard.json"));
        assert!(config.oracle.command.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn weights_must_sum_to_one() {
        let toml = format!("{LOCAL}\n[scoring]\nweight_height = 0.9\n");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("sum to 1")));
    }

    #[test]
    fn custom_weights_accepted() {
        let toml = format!(
            "{LOCAL}\n[scoring]\nweight_height = 0.5\nweight_area = 0.3\nweight_hull = 0.2\n"
        );
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.scoring.weight_hull, 0.2);
    }

    #[test]
    fn inverted_roi_rejected() {
        let toml = format!("{LOCAL}\n[analysis]\nroi = {{ x1 = 10, y1 = 10, x2 = 5, y2 = 20 }}\n");
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_stride_rejected() {
        let toml = format!("{LOCAL}\n[analysis]\nstride = 0\n");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn ssh_mode_requires_host() {
        let err = Config::from_toml("[capture]\nmode = \"ssh\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("capture.host")));
    }

    #[test]
    fn unknown_backend_rejected() {
        let toml = format!("{LOCAL}\n[leaderboard]\nbackend = \"redis\"\n");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config = Config::from_toml(include_str!("../../config.example.toml")).unwrap();
        assert_eq!(config.capture.host, "192.168.1.42");
        assert_eq!(config.analysis.fine, ThresholdProfile::fine());
        assert_eq!(config.leaderboard.record_path(), PathBuf::from("videos/leaderboard.json"));
    }

    #[test]
    fn parse_error_reported() {
        assert!(matches!(
            Config::from_toml("[capture"),
            Err(ConfigError::Parse(_))
        ));
    }
}
