use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifacts::same_path;

/// One ranked attempt: its score and the two media files that belong to it.
///
/// Serialized as `{"score": .., "video": .., "thumbnail": ..}`, the record
/// format read by the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub score: f64,
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

impl LeaderboardEntry {
    pub fn new(score: f64, video: impl Into<PathBuf>, thumbnail: impl Into<PathBuf>) -> Self {
        Self {
            score,
            video: video.into(),
            thumbnail: thumbnail.into(),
        }
    }

    pub fn artifacts(&self) -> [&Path; 2] {
        [&self.video, &self.thumbnail]
    }

    /// Whether `path` names one of this entry's files, aliases included.
    pub fn references(&self, path: &Path) -> bool {
        self.artifacts().iter().any(|a| same_path(a, path))
    }

    /// Both artifact files are present on disk.
    pub fn artifacts_exist(&self) -> bool {
        self.video.is_file() && self.thumbnail.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_record_object() {
        let entry = LeaderboardEntry::new(47.3, "videos/1_manu.mp4", "videos/1_manu.png");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "score": 47.3,
                "video": "videos/1_manu.mp4",
                "thumbnail": "videos/1_manu.png",
            })
        );
    }

    #[test]
    fn references_either_artifact() {
        let entry = LeaderboardEntry::new(1.0, "a.mp4", "a.png");
        assert!(entry.references(Path::new("a.mp4")));
        assert!(entry.references(Path::new("a.png")));
        assert!(!entry.references(Path::new("b.mp4")));
    }
}
