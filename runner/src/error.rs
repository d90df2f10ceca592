use splash_analyzer::{LocatorError, ReportError};
use splash_leaderboard::LeaderboardError;

/// Why a run stopped. Every variant except `Persistence` is raised before
/// the leaderboard is touched.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("analysis failed: {0}")]
    Analysis(String),
    #[error("no frame produced a usable score: {0}")]
    EmptyResult(String),
    #[error("failed to write analysis artifacts: {0}")]
    Artifact(#[from] ReportError),
    #[error("failed to update leaderboard: {0}")]
    Persistence(#[source] LeaderboardError),
    #[error("another run holds the leaderboard: {0}")]
    Lock(#[source] LeaderboardError),
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

impl From<LocatorError> for PipelineError {
    fn from(e: LocatorError) -> Self {
        match e {
            LocatorError::EmptyVideo | LocatorError::NoScore { .. } => {
                PipelineError::EmptyResult(e.to_string())
            }
            LocatorError::Source(source) => PipelineError::Analysis(source.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splash_analyzer::SourceError;

    #[test]
    fn locator_errors_map_to_stages() {
        assert!(matches!(
            PipelineError::from(LocatorError::EmptyVideo),
            PipelineError::EmptyResult(_)
        ));
        assert!(matches!(
            PipelineError::from(LocatorError::NoScore { start: 0, end: 3 }),
            PipelineError::EmptyResult(_)
        ));
        let decode = SourceError::Decode {
            index: 4,
            reason: "truncated".into(),
        };
        assert!(matches!(
            PipelineError::from(LocatorError::Source(decode)),
            PipelineError::Analysis(_)
        ));
    }
}
