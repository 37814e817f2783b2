use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Reserved extension carried by locked artifacts (without the dot).
///
/// This is the only on-disk signal of lock state, so it must never change.
pub const LOCKED_EXTENSION: &str = "dma";

/// Prefix and suffix of the temporary files written before an atomic rename
pub const IN_FLIGHT_PREFIX: &str = ".foldlock-";
pub const IN_FLIGHT_SUFFIX: &str = ".part";

/// True for a temporary file that has not been renamed into place yet.
///
/// Scans ignore these so a concurrent observer never counts a half-written
/// artifact.
pub fn is_in_flight(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(IN_FLIGHT_PREFIX) && n.ends_with(IN_FLIGHT_SUFFIX))
        .unwrap_or(false)
}

/// Lock state of a file, derived from its name on every scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    /// Plain file, eligible for locking
    Unlocked,
    /// Encrypted artifact carrying the `.dma` marker
    Locked,
}

impl FileState {
    /// Classify a path by its extension (case-insensitive).
    pub fn of(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case(LOCKED_EXTENSION) => FileState::Locked,
            _ => FileState::Unlocked,
        }
    }
}

/// `report.pdf` → `report.pdf.dma`
pub fn artifact_path(original: &Path) -> PathBuf {
    let mut name = original
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(LOCKED_EXTENSION);
    original.with_file_name(name)
}

/// `report.pdf.dma` → `report.pdf`
///
/// Returns `None` when the path is not an artifact or stripping the marker
/// would leave an empty name (a file literally called `.dma`).
pub fn original_path(artifact: &Path) -> Option<PathBuf> {
    if FileState::of(artifact) != FileState::Locked {
        return None;
    }
    let stem: OsString = artifact.file_stem()?.to_os_string();
    if stem.is_empty() {
        return None;
    }
    Some(artifact.with_file_name(stem))
}

/// Direction of a lock job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Lock,
    Unlock,
}

impl JobKind {
    /// The state files end up in once this job has processed them.
    pub fn target_state(self) -> FileState {
        match self {
            JobKind::Lock => FileState::Locked,
            JobKind::Unlock => FileState::Unlocked,
        }
    }
}

/// Progress notification emitted after each processed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub file_name: String,
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(done: usize, total: usize, file_name: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        Self {
            percent,
            file_name: file_name.into(),
            done,
            total,
        }
    }
}

/// Terminal outcome of a job that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobReport {
    /// Every eligible file was processed
    Done {
        processed: usize,
        /// Files already in the target state
        skipped: usize,
    },
    /// The caller requested cancellation between two files
    Cancelled { completed: usize, remaining: usize },
}

impl JobReport {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobReport::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_marker_case_insensitive() {
        assert_eq!(FileState::of(Path::new("a.txt.dma")), FileState::Locked);
        assert_eq!(FileState::of(Path::new("a.txt.DMA")), FileState::Locked);
        assert_eq!(FileState::of(Path::new("a.txt")), FileState::Unlocked);
        assert_eq!(FileState::of(Path::new("dma")), FileState::Unlocked);
        assert_eq!(FileState::of(Path::new("a.dmax")), FileState::Unlocked);
    }

    #[test]
    fn test_artifact_and_original_names() {
        let src = Path::new("/data/report.final.pdf");
        let art = artifact_path(src);
        assert_eq!(art, PathBuf::from("/data/report.final.pdf.dma"));
        assert_eq!(original_path(&art).unwrap(), src);
    }

    #[test]
    fn test_artifact_name_for_extensionless_file() {
        let art = artifact_path(Path::new("Makefile"));
        assert_eq!(art, PathBuf::from("Makefile.dma"));
        assert_eq!(original_path(&art).unwrap(), PathBuf::from("Makefile"));
    }

    #[test]
    fn test_original_path_rejects_non_artifacts() {
        assert!(original_path(Path::new("notes.txt")).is_none());
        // `.dma` alone is a hidden file with no extension
        assert!(original_path(Path::new(".dma")).is_none());
    }

    #[test]
    fn test_in_flight_names() {
        assert!(is_in_flight(Path::new("/d/.foldlock-a1B2c3.part")));
        assert!(!is_in_flight(Path::new("/d/.foldlock-notes.txt")));
        assert!(!is_in_flight(Path::new("/d/report.part")));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(Progress::new(1, 3, "a").percent, 33);
        assert_eq!(Progress::new(3, 3, "c").percent, 100);
        assert_eq!(Progress::new(0, 0, "").percent, 100);
    }

    #[test]
    fn test_target_state() {
        assert_eq!(JobKind::Lock.target_state(), FileState::Locked);
        assert_eq!(JobKind::Unlock.target_state(), FileState::Unlocked);
    }
}
