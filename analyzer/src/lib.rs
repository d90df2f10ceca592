pub mod ffmpeg;
pub mod locator;
pub mod mask;
pub mod measure;
pub mod oracle;
pub mod overlay;
pub mod report;
pub mod score;
pub mod source;

pub use ffmpeg::FfmpegSource;
pub use locator::{FrameObserver, LocatorError, LocatorResult, PeakLocator, ScoreRecord};
pub use mask::{MaskBuilder, Profile, SplashMask};
pub use measure::{measure, SplashMetrics};
pub use oracle::{NoOracle, OracleError, OraclePrediction, ProcessOracle, SegmentationOracle};
pub use report::{write_report, OverlayVideo, ReportError, ReportPaths};
pub use score::ScoreModel;
pub use source::{FrameSource, MemorySource, SampledIndices, SourceError};
