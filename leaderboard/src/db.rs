use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::entry::LeaderboardEntry;
use crate::error::{LeaderboardError, Result};
use crate::record::RecordStore;

/// SQLite-backed leaderboard record.
///
/// Schema: a single `leaderboard` table keyed by rank. A write replaces every
/// row inside one transaction, so readers never see a half-updated ranking.
/// WAL mode lets the API layer read while a run writes.
pub struct SqliteRecord {
    conn: Connection,
    path: PathBuf,
}

impl SqliteRecord {
    /// Open (or create) the database. Creates the parent directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LeaderboardError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS leaderboard (
                rank      INTEGER PRIMARY KEY,
                score     REAL    NOT NULL CHECK(score >= 0 AND score <= 100),
                video     TEXT    NOT NULL UNIQUE,
                thumbnail TEXT    NOT NULL UNIQUE
            );",
        )?;

        info!(path = path.display().to_string(), "SQLite leaderboard opened");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }
}

impl RecordStore for SqliteRecord {
    fn read(&self) -> Result<Option<Vec<LeaderboardEntry>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT score, video, thumbnail FROM leaderboard ORDER BY rank ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(LeaderboardEntry {
                score: row.get(0)?,
                video: PathBuf::from(row.get::<_, String>(1)?),
                thumbnail: PathBuf::from(row.get::<_, String>(2)?),
            })
        })?;
        let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(entries))
    }

    fn write(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM leaderboard", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO leaderboard (rank, score, video, thumbnail) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (i, entry) in entries.iter().enumerate() {
                insert.execute(params![
                    (i + 1) as i64,
                    entry.score,
                    entry.video.to_string_lossy().into_owned(),
                    entry.thumbnail.to_string_lossy().into_owned(),
                ])?;
            }
        }
        tx.commit()
            .map_err(|e| LeaderboardError::Persist(e.to_string()))?;
        debug!(path = %self.path.display(), entries = entries.len(), "leaderboard rows replaced");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
