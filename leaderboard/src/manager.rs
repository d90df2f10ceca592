use std::path::{Path, PathBuf};

use splash_common::config::LeaderboardConfig;
use tracing::{debug, info, warn};

use crate::artifacts::{
    canonical_name, extension_of, move_file, remove_artifact, rename_without_overwrite, same_path,
    staging_path,
};
use crate::entry::LeaderboardEntry;
use crate::error::{LeaderboardError, Result};
use crate::record::RecordStore;

pub const MAX_SCORE: f64 = 100.0;

/// Placement and naming rules for leaderboard artifacts.
#[derive(Debug, Clone)]
pub struct LeaderboardOptions {
    pub dir: PathBuf,
    pub capacity: usize,
    pub artifact_stem: String,
    pub rename_attempts: u32,
}

impl LeaderboardOptions {
    pub fn from_config(config: &LeaderboardConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            capacity: config.capacity,
            artifact_stem: config.artifact_stem.clone(),
            rename_attempts: config.rename_attempts,
        }
    }
}

/// What happened to a submitted candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Kept at this 1-based rank.
    Ranked { rank: usize, evicted: usize },
    /// Did not make the top K. Its artifacts were deleted.
    Dropped,
}

/// Ranked, capped list of attempts whose artifacts live under one directory.
///
/// Every mutation goes through [`Leaderboard::submit`], which keeps the list
/// sorted, evicts past `capacity` and renames survivors to `{rank}_{stem}`.
/// Nothing reaches the backing record until [`Leaderboard::persist`].
pub struct Leaderboard<S> {
    store: S,
    options: LeaderboardOptions,
    entries: Vec<LeaderboardEntry>,
}

impl<S: RecordStore> Leaderboard<S> {
    /// An empty board that will persist to `store`.
    pub fn new(store: S, options: LeaderboardOptions) -> Self {
        Self {
            store,
            options,
            entries: Vec::new(),
        }
    }

    /// Read the persisted board. A missing record is an empty board.
    ///
    /// Entries whose artifacts no longer exist are dropped, and their
    /// surviving artifact file is deleted.
    pub fn load(store: S, options: LeaderboardOptions) -> Result<Self> {
        let mut entries = store.read()?.unwrap_or_default();
        let before = entries.len();

        entries.retain(|entry| {
            if entry.artifacts_exist() {
                return true;
            }
            warn!(
                score = entry.score,
                video = %entry.video.display(),
                thumbnail = %entry.thumbnail.display(),
                "dropping entry with missing artifacts"
            );
            for path in entry.artifacts() {
                if path.exists() {
                    remove_artifact(path);
                }
            }
            false
        });
        sort_descending(&mut entries);

        info!(
            record = %store.location().display(),
            entries = entries.len(),
            pruned = before - entries.len(),
            "leaderboard loaded"
        );
        Ok(Self {
            store,
            options,
            entries,
        })
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn options(&self) -> &LeaderboardOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merge a candidate into the board.
    ///
    /// The candidate is validated before anything is touched. Equal scores
    /// keep the incumbent ahead. Entries pushed past `capacity` have their
    /// artifacts deleted, the candidate included when it does not place.
    /// If a surviving artifact cannot be staged for renaming, the staged
    /// moves are undone and the board is left as it was.
    pub fn submit(
        &mut self,
        score: f64,
        video: &Path,
        thumbnail: &Path,
    ) -> Result<SubmitOutcome> {
        self.validate_candidate(score, video, thumbnail)?;
        let dir = &self.options.dir;
        std::fs::create_dir_all(dir).map_err(|e| LeaderboardError::io(dir, e))?;

        let candidate = LeaderboardEntry::new(score, video, thumbnail);
        let mut working = self.entries.clone();
        working.push(candidate.clone());
        sort_descending(&mut working);

        let capacity = self.options.capacity.max(1);
        let evicted = if working.len() > capacity {
            working.split_off(capacity)
        } else {
            Vec::new()
        };
        let rank = working.iter().position(|e| *e == candidate).map(|i| i + 1);

        let staged = self.stage(&mut working)?;

        for entry in &evicted {
            info!(
                score = entry.score,
                video = %entry.video.display(),
                "entry evicted"
            );
            for path in entry.artifacts() {
                remove_artifact(path);
            }
        }

        self.commit(&mut working, staged);
        self.entries = working;

        let outcome = match rank {
            Some(rank) => SubmitOutcome::Ranked {
                rank,
                evicted: evicted.len(),
            },
            None => SubmitOutcome::Dropped,
        };
        info!(score, outcome = ?outcome, size = self.entries.len(), "candidate submitted");
        Ok(outcome)
    }

    /// Atomically replace the backing record with the current board.
    pub fn persist(&self) -> Result<()> {
        self.store.write(&self.entries)?;
        info!(
            record = %self.store.location().display(),
            entries = self.entries.len(),
            "leaderboard persisted"
        );
        Ok(())
    }

    fn validate_candidate(&self, score: f64, video: &Path, thumbnail: &Path) -> Result<()> {
        if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
            return Err(LeaderboardError::InvalidScore(score));
        }
        for path in [video, thumbnail] {
            if !path.is_file() {
                return Err(LeaderboardError::MissingArtifact(path.to_path_buf()));
            }
        }
        if same_path(video, thumbnail) {
            return Err(LeaderboardError::DuplicateArtifact(video.to_path_buf()));
        }
        for path in [video, thumbnail] {
            if self.entries.iter().any(|e| e.references(path)) {
                return Err(LeaderboardError::DuplicateArtifact(path.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Phase one of renaming: park each artifact that is not already at its
    /// canonical name under a unique staging name inside the board directory.
    ///
    /// Once every target is vacated, no commit can overwrite a live artifact.
    /// On failure the parked files are moved back and the error returned.
    fn stage(&self, entries: &mut [LeaderboardEntry]) -> Result<Vec<Staged>> {
        let dir = &self.options.dir;
        let stem = &self.options.artifact_stem;

        let mut staged: Vec<Staged> = Vec::new();
        for i in 0..entries.len() {
            for slot in [Slot::Video, Slot::Thumbnail] {
                let current = slot.get(&entries[i]).to_path_buf();
                let ext = extension_of(&current);
                let target = dir.join(canonical_name(i + 1, stem, &ext, None));
                let in_dir = current.parent().is_some_and(|p| same_path(p, dir));
                if in_dir && current.file_name() == target.file_name() {
                    continue;
                }

                let parked = staging_path(dir, &ext);
                if let Err(e) = move_file(&current, &parked) {
                    warn!(path = %current.display(), error = %e, "could not stage artifact, rolling back");
                    unstage(entries, staged);
                    return Err(LeaderboardError::io(&current, e));
                }
                debug!(from = %current.display(), to = %parked.display(), "artifact staged");
                *slot.get_mut(&mut entries[i]) = parked;
                staged.push(Staged {
                    index: i,
                    slot,
                    original: current,
                });
            }
        }
        Ok(staged)
    }

    /// Phase two: move parked files to `{rank}_{stem}`. A target still
    /// occupied belongs to an unrelated file and gets a numeric suffix.
    fn commit(&self, entries: &mut [LeaderboardEntry], staged: Vec<Staged>) {
        let dir = &self.options.dir;
        let stem = &self.options.artifact_stem;

        for Staged { index, slot, .. } in staged {
            let rank = index + 1;
            let entry = &mut entries[index];
            let parked = slot.get(entry).to_path_buf();
            let ext = extension_of(&parked);
            match rename_without_overwrite(&parked, dir, rank, stem, &ext, self.options.rename_attempts)
            {
                Some(placed) => {
                    debug!(rank, path = %placed.display(), "artifact renamed");
                    *slot.get_mut(entry) = placed;
                }
                None => {
                    warn!(rank, path = %parked.display(), "artifact kept at staging name");
                }
            }
        }
    }
}

/// An artifact parked under a staging name, and where it came from.
struct Staged {
    index: usize,
    slot: Slot,
    original: PathBuf,
}

/// Move parked artifacts back to where they were, newest first.
fn unstage(entries: &mut [LeaderboardEntry], staged: Vec<Staged>) {
    for Staged {
        index,
        slot,
        original,
    } in staged.into_iter().rev()
    {
        let entry = &mut entries[index];
        let parked = slot.get(entry).to_path_buf();
        match move_file(&parked, &original) {
            Ok(()) => *slot.get_mut(entry) = original,
            Err(e) => {
                warn!(parked = %parked.display(), original = %original.display(), error = %e, "could not restore staged artifact")
            }
        }
    }
}

/// Stable descending sort. Earlier entries win ties.
fn sort_descending(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Video,
    Thumbnail,
}

impl Slot {
    fn get(self, entry: &LeaderboardEntry) -> &Path {
        match self {
            Slot::Video => &entry.video,
            Slot::Thumbnail => &entry.thumbnail,
        }
    }

    fn get_mut(self, entry: &mut LeaderboardEntry) -> &mut PathBuf {
        match self {
            Slot::Video => &mut entry.video,
            Slot::Thumbnail => &mut entry.thumbnail,
        }
    }
}
