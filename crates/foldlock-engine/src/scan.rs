//! Directory scan: immediate regular files, classified by name.

use foldlock_core::types::is_in_flight;
use foldlock_core::{FileState, LockerError, LockerResult};
use std::path::{Path, PathBuf};

/// A regular file found directly inside the scanned directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub state: FileState,
}

/// First few entries of a directory plus how many were left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub entries: Vec<Entry>,
    pub remaining: usize,
}

/// List the regular files directly inside `dir`, sorted by name.
///
/// Subdirectories, symlinks and in-flight temp files are skipped. Nothing is
/// modified.
pub fn scan(dir: &Path) -> LockerResult<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir).map_err(|e| LockerError::io(dir, e))? {
        let item = item.map_err(|e| LockerError::io(dir, e))?;
        let path = item.path();
        // file_type() does not follow symlinks
        let file_type = item.file_type().map_err(|e| LockerError::io(&path, e))?;
        if !file_type.is_file() || is_in_flight(&path) {
            continue;
        }
        entries.push(Entry {
            name: item.file_name().to_string_lossy().into_owned(),
            state: FileState::of(&path),
            path,
        });
    }
    entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(entries)
}

/// Count `(normal, locked)` files directly inside `dir`.
pub fn count_files(dir: &Path) -> LockerResult<(u32, u32)> {
    let counts = scan(dir)?
        .iter()
        .fold((0u32, 0u32), |(normal, locked), entry| match entry.state {
            FileState::Unlocked => (normal + 1, locked),
            FileState::Locked => (normal, locked + 1),
        });
    tracing::debug!(dir = %dir.display(), normal = counts.0, locked = counts.1, "counted files");
    Ok(counts)
}

/// The first `limit` entries of `dir` and the number not shown.
pub fn preview(dir: &Path, limit: usize) -> LockerResult<Preview> {
    let mut entries = scan(dir)?;
    let remaining = entries.len().saturating_sub(limit);
    entries.truncate(limit);
    Ok(Preview { entries, remaining })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        std::fs::write(dir.join("b.txt"), b"b").unwrap();
        std::fs::write(dir.join("a.txt"), b"a").unwrap();
        std::fs::write(dir.join("c.pdf.dma"), b"locked").unwrap();
        std::fs::write(dir.join("D.JPG.DMA"), b"locked").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/inner.txt"), b"skip").unwrap();
        std::fs::write(dir.join(".foldlock-x1y2.part"), b"partial").unwrap();
    }

    #[test]
    fn test_count_files() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());
        assert_eq!(count_files(tmp.path()).unwrap(), (2, 2));
    }

    #[test]
    fn test_scan_is_sorted_and_flat() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());
        let names: Vec<String> = scan(tmp.path()).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["D.JPG.DMA", "a.txt", "b.txt", "c.pdf.dma"]);
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(count_files(tmp.path()).unwrap(), (0, 0));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = count_files(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, LockerError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("real.txt"), b"r").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("link.txt"))
            .unwrap();
        assert_eq!(count_files(tmp.path()).unwrap(), (1, 0));
    }

    #[test]
    fn test_preview_limit() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let shown = preview(tmp.path(), 3).unwrap();
        assert_eq!(shown.entries.len(), 3);
        assert_eq!(shown.remaining, 1);

        let all = preview(tmp.path(), 10).unwrap();
        assert_eq!(all.entries.len(), 4);
        assert_eq!(all.remaining, 0);
        assert_eq!(all.entries[3].state, FileState::Locked);
    }
}
