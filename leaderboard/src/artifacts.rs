//! Artifact file moves, canonical rank names and tolerant deletion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, info, warn};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a plain rename first. On EXDEV it copies to a temp file beside
/// `dst`, renames that into place and then removes the source.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-device rename, falling back to copy+delete"
            );
            copy_and_delete(src, dst)
        }
        Err(e) => Err(e),
    }
}

/// EXDEV is error code 18 on Linux and macOS.
fn is_cross_device_error(e: &io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

fn copy_and_delete(src: &Path, dst: &Path) -> io::Result<()> {
    let tmp = dst.with_extension("partial");
    if let Err(e) = fs::copy(src, &tmp) {
        error!(src = %src.display(), tmp = %tmp.display(), error = %e, "copy failed during cross-device move");
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, dst) {
        let _ = fs::remove_file(&tmp);
        error!(tmp = %tmp.display(), dst = %dst.display(), error = %e, "rename failed during cross-device move");
        return Err(e);
    }
    if let Err(e) = fs::remove_file(src) {
        warn!(src = %src.display(), error = %e, "failed to remove source after cross-device move");
    }
    Ok(())
}

/// Delete an evicted artifact. Failures are logged, never returned.
pub fn remove_artifact(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "evicted artifact deleted");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "evicted artifact already missing");
            false
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete evicted artifact");
            false
        }
    }
}

/// `{rank}_{stem}.{ext}`, or `{rank}_{stem}_{suffix}.{ext}` for a fallback.
pub fn canonical_name(rank: usize, stem: &str, ext: &str, suffix: Option<u32>) -> String {
    let base = match suffix {
        Some(n) => format!("{rank}_{stem}_{n}"),
        None => format!("{rank}_{stem}"),
    };
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh, unused path in `dir` for parking an artifact between the two
/// rename phases.
pub fn staging_path(dir: &Path, ext: &str) -> PathBuf {
    let pid = std::process::id();
    loop {
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = if ext.is_empty() {
            format!(".staging-{pid}-{n}")
        } else {
            format!(".staging-{pid}-{n}.{ext}")
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// Rename `src` to `target`, or to the first free numeric-suffixed sibling
/// when `target` is taken. Never overwrites. Returns the final path, or
/// `None` if every name was taken or the rename failed.
pub fn rename_without_overwrite(
    src: &Path,
    dir: &Path,
    rank: usize,
    stem: &str,
    ext: &str,
    attempts: u32,
) -> Option<PathBuf> {
    let suffixes = std::iter::once(None).chain((1..=attempts).map(Some));
    for suffix in suffixes {
        let target = dir.join(canonical_name(rank, stem, ext, suffix));
        if target.exists() {
            if suffix.is_none() {
                warn!(target = %target.display(), "canonical name taken by unrelated file");
            }
            continue;
        }
        return match fs::rename(src, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(src = %src.display(), target = %target.display(), error = %e, "rename failed");
                None
            }
        };
    }
    warn!(src = %src.display(), rank, attempts, "no free name for artifact");
    None
}

/// Whether two paths name the same file or directory, resolving `..`,
/// symlinks and relative forms. Paths that do not exist compare literally.
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
