pub mod capture;
pub mod error;
pub mod pipeline;
pub mod transfer;

pub use capture::{Capture, LocalCapture, RemoteClip, SshCapture};
pub use error::PipelineError;
pub use pipeline::{
    build_oracle, open_video, run_once, run_pipeline, spawn_run, BoxedOracle, BoxedSource,
    RunSummary,
};
pub use transfer::{timestamped_name, LocalTransfer, ScpTransfer, Transfer};
