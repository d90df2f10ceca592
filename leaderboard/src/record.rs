use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use splash_common::config::LeaderboardConfig;
use tracing::{debug, warn};

use crate::db::SqliteRecord;
use crate::entry::LeaderboardEntry;
use crate::error::{LeaderboardError, Result};

/// Durable backing record for the ranked list.
///
/// `read` returns `None` when no record exists yet. `write` replaces the whole
/// record atomically: a concurrent reader sees either the old or the new list.
pub trait RecordStore {
    fn read(&self) -> Result<Option<Vec<LeaderboardEntry>>>;
    fn write(&self, entries: &[LeaderboardEntry]) -> Result<()>;
    fn location(&self) -> &Path;
}

/// Pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonRecord {
    path: PathBuf,
}

impl JsonRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "leaderboard".into());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }
}

impl RecordStore for JsonRecord {
    fn read(&self) -> Result<Option<Vec<LeaderboardEntry>>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LeaderboardError::io(&self.path, e)),
        };
        let entries = serde_json::from_str(&content).map_err(|e| LeaderboardError::Corrupt {
            path: self.path.clone(),
            msg: e.to_string(),
        })?;
        Ok(Some(entries))
    }

    fn write(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LeaderboardError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| LeaderboardError::Persist(e.to_string()))?;

        let tmp = self.temp_path();
        let written = File::create(&tmp).and_then(|mut f| {
            f.write_all(&json)?;
            f.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(LeaderboardError::Persist(format!(
                "failed to write {}: {e}",
                tmp.display()
            )));
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(LeaderboardError::Persist(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }
        sync_parent(&self.path);

        debug!(path = %self.path.display(), entries = entries.len(), "leaderboard record written");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Flush the directory entry of a freshly renamed file. Best effort.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
                warn!(dir = %parent.display(), error = %e, "failed to sync directory");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Store selected by the `leaderboard.backend` setting.
pub enum AnyRecord {
    Json(JsonRecord),
    Sqlite(SqliteRecord),
}

impl AnyRecord {
    pub fn open(config: &LeaderboardConfig) -> Result<Self> {
        let path = config.record_path();
        match config.backend.as_str() {
            "sqlite" => Ok(Self::Sqlite(SqliteRecord::open(&path)?)),
            _ => Ok(Self::Json(JsonRecord::new(path))),
        }
    }
}

impl RecordStore for AnyRecord {
    fn read(&self) -> Result<Option<Vec<LeaderboardEntry>>> {
        match self {
            Self::Json(r) => r.read(),
            Self::Sqlite(r) => r.read(),
        }
    }

    fn write(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        match self {
            Self::Json(r) => r.write(entries),
            Self::Sqlite(r) => r.write(entries),
        }
    }

    fn location(&self) -> &Path {
        match self {
            Self::Json(r) => r.location(),
            Self::Sqlite(r) => r.location(),
        }
    }
}
