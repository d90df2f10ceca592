use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{LeaderboardError, Result};

pub const LOCK_FILENAME: &str = ".splash-run.lock";

/// How long a lock without a readable pid is assumed to be mid-write.
const PID_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Advisory lock serializing pipeline runs over one leaderboard directory.
///
/// The lock file holds the owner pid. A lock left behind by a dead process is
/// considered stale and taken over. The file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| LeaderboardError::io(dir, e))?;
        let path = dir.join(LOCK_FILENAME);

        // Second attempt only after a stale lock was cleared.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let pid = std::process::id();
                    let content = serde_json::json!({
                        "pid": pid,
                        "acquired_at": chrono::Utc::now().to_rfc3339(),
                    });
                    file.write_all(content.to_string().as_bytes())
                        .and_then(|_| file.sync_all())
                        .map_err(|e| LeaderboardError::io(&path, e))?;
                    info!(path = %path.display(), pid, "run lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let observed = fs::read_to_string(&path).unwrap_or_default();
                    let holder = parse_pid(&observed);
                    match holder {
                        Some(pid) if is_process_alive(pid) => {
                            return Err(LeaderboardError::Locked { path, pid });
                        }
                        // The owner may not have written its pid yet.
                        None if recently_modified(&path) => {
                            return Err(LeaderboardError::Locked { path, pid: 0 });
                        }
                        _ => {
                            warn!(path = %path.display(), pid = ?holder, "removing stale run lock");
                            let cleared = remove_if_unchanged(&path, &observed)
                                .map_err(|e| LeaderboardError::io(&path, e))?;
                            if !cleared {
                                break;
                            }
                        }
                    }
                }
                Err(e) => return Err(LeaderboardError::io(&path, e)),
            }
        }

        // Another process took the lock while we were clearing the stale one.
        let pid = fs::read_to_string(&path)
            .ok()
            .and_then(|c| parse_pid(&c))
            .unwrap_or(0);
        Err(LeaderboardError::Locked { path, pid })
    }

    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "run lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove run lock"),
        }
    }
}

/// Remove the lock at `path` only if it still holds `observed`.
///
/// The file is renamed aside first, so a lock another process created after
/// `observed` was read is put back rather than deleted. Returns whether the
/// stale lock is gone.
fn remove_if_unchanged(path: &Path, observed: &str) -> std::io::Result<bool> {
    let aside = path.with_extension(format!("stale.{}", std::process::id()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    }
    let current = fs::read_to_string(&aside).unwrap_or_default();
    if current == observed {
        fs::remove_file(&aside)?;
        return Ok(true);
    }

    debug!(path = %path.display(), "run lock changed hands, restoring it");
    let restored = fs::hard_link(&aside, path);
    fs::remove_file(&aside)?;
    match restored {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn recently_modified(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age < PID_WRITE_GRACE)
}

fn parse_pid(content: &str) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value.get("pid")?.as_u64().and_then(|p| u32::try_from(p).ok())
}

fn is_process_alive(pid: u32) -> bool {
    // pid 0 and values past i32::MAX would address process groups.
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        // Signal 0 checks existence without delivering anything.
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
