pub mod artifacts;
pub mod db;
pub mod entry;
pub mod error;
pub mod lock;
pub mod manager;
pub mod record;

use std::path::{Path, PathBuf};

pub use db::SqliteRecord;
pub use entry::LeaderboardEntry;
pub use error::{LeaderboardError, Result};
pub use lock::RunLock;
pub use manager::{Leaderboard, LeaderboardOptions, SubmitOutcome};
pub use record::{AnyRecord, JsonRecord, RecordStore};

/// Current ranking as stored, without touching artifacts. A missing record
/// reads as an empty list.
pub fn read_record<S: RecordStore + ?Sized>(store: &S) -> Result<Vec<LeaderboardEntry>> {
    Ok(store.read()?.unwrap_or_default())
}

/// Map a client-supplied artifact name to a file inside `dir`.
///
/// Only the final path component of `name` is used, so `../secret` resolves
/// to `dir/secret`. Returns `None` when no such file exists.
pub fn resolve_artifact(dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = Path::new(name).file_name()?;
    let path = dir.join(file_name);
    path.is_file().then_some(path)
}
