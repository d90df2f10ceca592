pub mod config;
pub mod frame;

pub use config::{Config, ConfigError, ThresholdProfile};
pub use frame::{Frame, RegionOfInterest, VideoInfo};
