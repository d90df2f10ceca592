use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("leaderboard record {path} is corrupt: {msg}")]
    Corrupt { path: PathBuf, msg: String },
    #[error("failed to persist leaderboard: {0}")]
    Persist(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("score {0} is outside 0..=100")]
    InvalidScore(f64),
    #[error("artifact {0} is already on the leaderboard")]
    DuplicateArtifact(PathBuf),
    #[error("artifact {0} does not exist")]
    MissingArtifact(PathBuf),
    #[error("leaderboard at {path} is locked by running process {pid}")]
    Locked { path: PathBuf, pid: u32 },
}

impl LeaderboardError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LeaderboardError>;
