//! Whole-file lock and unlock.
//!
//! Each operation writes its output to a hidden temp file in the same
//! directory, renames it into place without clobbering, and only then deletes
//! the input. A crash at any point leaves at least one complete copy.

use foldlock_core::types::{artifact_path, original_path, IN_FLIGHT_PREFIX, IN_FLIGHT_SUFFIX};
use foldlock_core::{FileState, LockerError, LockerResult};
use std::fs::Permissions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::container::{open, seal};
use crate::keyring::KeyRing;

/// Encrypt `path` into `<name>.dma` and delete the original.
pub fn lock_file(path: &Path, keys: &mut KeyRing) -> LockerResult<PathBuf> {
    if FileState::of(path) == FileState::Locked {
        return Err(LockerError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "file is already locked"),
        ));
    }

    let plaintext = Zeroizing::new(std::fs::read(path).map_err(|e| LockerError::io(path, e))?);
    let dest = artifact_path(path);

    if dest.exists() {
        return finish_interrupted(path, &dest, &plaintext, |existing| {
            open(keys, existing).ok()
        });
    }

    let sealed = seal(keys, &plaintext).map_err(|e| LockerError::crypto(path, format!("{e:#}")))?;
    let permissions = permissions_of(path)?;
    write_new(&dest, &sealed, permissions)?;
    remove(path)?;

    tracing::debug!(
        src = %path.display(),
        dest = %dest.display(),
        plain = plaintext.len(),
        sealed = sealed.len(),
        "locked"
    );
    Ok(dest)
}

/// Decrypt a `.dma` artifact back to its original name and delete it.
pub fn unlock_file(path: &Path, keys: &mut KeyRing) -> LockerResult<PathBuf> {
    let dest = original_path(path).ok_or_else(|| {
        LockerError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a locked artifact"),
        )
    })?;

    let blob = std::fs::read(path).map_err(|e| LockerError::io(path, e))?;
    let plaintext = open(keys, &blob).map_err(|e| LockerError::crypto(path, format!("{e:#}")))?;

    if dest.exists() {
        return finish_interrupted(path, &dest, &plaintext, |existing| {
            Some(Zeroizing::new(existing.to_vec()))
        });
    }

    let permissions = permissions_of(path)?;
    write_new(&dest, &plaintext, permissions)?;
    remove(path)?;

    tracing::debug!(
        src = %path.display(),
        dest = %dest.display(),
        plain = plaintext.len(),
        "unlocked"
    );
    Ok(dest)
}

/// The destination already exists. When it holds exactly `plaintext` a
/// previous run was interrupted between rename and delete, so the source is
/// removed to complete it. Anything else is a name collision and nothing is
/// touched.
fn finish_interrupted<F>(
    src: &Path,
    dest: &Path,
    plaintext: &[u8],
    recover: F,
) -> LockerResult<PathBuf>
where
    F: FnOnce(&[u8]) -> Option<Zeroizing<Vec<u8>>>,
{
    let existing = std::fs::read(dest).map_err(|e| LockerError::io(dest, e))?;
    match recover(&existing) {
        Some(recovered) if recovered.as_slice() == plaintext => {
            remove(src)?;
            tracing::info!(
                src = %src.display(),
                dest = %dest.display(),
                "completed interrupted operation"
            );
            Ok(dest.to_path_buf())
        }
        _ => Err(LockerError::io(
            dest,
            io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
        )),
    }
}

/// Write `bytes` to a fresh file at `dest`; fails if `dest` appears meanwhile.
fn write_new(dest: &Path, bytes: &[u8], permissions: Permissions) -> LockerResult<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(IN_FLIGHT_PREFIX)
        .suffix(IN_FLIGHT_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| LockerError::io(dir, e))?;

    tmp.write_all(bytes).map_err(|e| LockerError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LockerError::io(tmp.path(), e))?;
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(|e| LockerError::io(tmp.path(), e))?;

    // The temp file is removed on drop if the rename fails
    tmp.persist_noclobber(dest)
        .map_err(|e| LockerError::io(dest, e.error))?;
    Ok(())
}

fn permissions_of(path: &Path) -> LockerResult<Permissions> {
    std::fs::metadata(path)
        .map(|m| m.permissions())
        .map_err(|e| LockerError::io(path, e))
}

fn remove(path: &Path) -> LockerResult<()> {
    std::fs::remove_file(path).map_err(|e| LockerError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::test_params;
    use secrecy::SecretString;
    use tempfile::TempDir;

    fn ring(password: &str) -> KeyRing {
        KeyRing::new(SecretString::from(password.to_string()), test_params())
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_lock_then_unlock_restores_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("notes.txt");
        std::fs::write(&src, b"meeting at noon").unwrap();
        let mut keys = ring("pw");

        let artifact = lock_file(&src, &mut keys).unwrap();
        assert_eq!(artifact, tmp.path().join("notes.txt.dma"));
        assert_eq!(names(tmp.path()), vec!["notes.txt.dma"]);
        assert_ne!(std::fs::read(&artifact).unwrap(), b"meeting at noon");

        let restored = unlock_file(&artifact, &mut keys).unwrap();
        assert_eq!(restored, src);
        assert_eq!(names(tmp.path()), vec!["notes.txt"]);
        assert_eq!(std::fs::read(&src).unwrap(), b"meeting at noon");
    }

    #[test]
    fn test_unlock_in_a_later_job() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.bin");
        std::fs::write(&src, [0u8, 1, 2, 3]).unwrap();

        let artifact = lock_file(&src, &mut ring("pw")).unwrap();
        unlock_file(&artifact, &mut ring("pw")).unwrap();
        assert_eq!(std::fs::read(&src).unwrap(), [0u8, 1, 2, 3]);
    }

    #[test]
    fn test_lock_rejects_artifact() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("x.dma");
        std::fs::write(&src, b"whatever").unwrap();
        let err = lock_file(&src, &mut ring("pw")).unwrap_err();
        assert!(matches!(err, LockerError::Io { .. }), "got: {err:?}");
        assert_eq!(std::fs::read(&src).unwrap(), b"whatever");
    }

    #[test]
    fn test_unlock_rejects_plain_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("x.txt");
        std::fs::write(&src, b"plain").unwrap();
        assert!(unlock_file(&src, &mut ring("pw")).is_err());
        assert!(src.exists());
    }

    #[test]
    fn test_wrong_password_leaves_artifact() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("secret.txt");
        std::fs::write(&src, b"top secret").unwrap();
        let artifact = lock_file(&src, &mut ring("right")).unwrap();

        let err = unlock_file(&artifact, &mut ring("wrong")).unwrap_err();
        assert!(matches!(err, LockerError::Crypto { .. }), "got: {err:?}");
        assert_eq!(names(tmp.path()), vec!["secret.txt.dma"]);
    }

    #[test]
    fn test_costly_artifact_is_refused_and_kept() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("big.txt");
        std::fs::write(&src, b"payload").unwrap();
        let artifact = lock_file(&src, &mut ring("pw")).unwrap();

        let mut bytes = std::fs::read(&artifact).unwrap();
        bytes[4..8].copy_from_slice(&(2u32 * 1024 * 1024).to_le_bytes());
        std::fs::write(&artifact, &bytes).unwrap();

        let mut keys = ring("pw");
        let err = unlock_file(&artifact, &mut keys).unwrap_err();
        assert!(matches!(err, LockerError::Crypto { .. }), "got: {err:?}");
        assert_eq!(keys.derivations(), 0);
        assert_eq!(names(tmp.path()), vec!["big.txt.dma"]);
        assert_eq!(std::fs::read(&artifact).unwrap(), bytes);
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = lock_file(&tmp.path().join("gone.txt"), &mut ring("pw")).unwrap_err();
        assert!(matches!(err, LockerError::Io { .. }));
    }

    #[test]
    fn test_interrupted_lock_is_completed() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.txt");
        std::fs::write(&src, b"draft").unwrap();
        let mut keys = ring("pw");

        // Simulate a crash after the rename: artifact present, source not deleted
        let artifact = lock_file(&src, &mut keys).unwrap();
        std::fs::write(&src, b"draft").unwrap();

        assert_eq!(lock_file(&src, &mut keys).unwrap(), artifact);
        assert_eq!(names(tmp.path()), vec!["doc.txt.dma"]);
    }

    #[test]
    fn test_interrupted_unlock_is_completed() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.txt");
        std::fs::write(&src, b"draft").unwrap();
        let mut keys = ring("pw");
        let artifact = lock_file(&src, &mut keys).unwrap();

        std::fs::write(&src, b"draft").unwrap();
        assert_eq!(unlock_file(&artifact, &mut keys).unwrap(), src);
        assert_eq!(names(tmp.path()), vec!["doc.txt"]);
    }

    #[test]
    fn test_name_collision_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.txt");
        std::fs::write(&src, b"new content").unwrap();
        std::fs::write(tmp.path().join("doc.txt.dma"), b"unrelated bytes").unwrap();

        let err = lock_file(&src, &mut ring("pw")).unwrap_err();
        match err {
            LockerError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected Io, got {other:?}"),
        }
        assert_eq!(std::fs::read(&src).unwrap(), b"new content");
        assert_eq!(
            std::fs::read(tmp.path().join("doc.txt.dma")).unwrap(),
            b"unrelated bytes"
        );
    }

    #[test]
    fn test_unlock_collision_with_different_plaintext() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.txt");
        std::fs::write(&src, b"v1").unwrap();
        let mut keys = ring("pw");
        let artifact = lock_file(&src, &mut keys).unwrap();
        std::fs::write(&src, b"v2").unwrap();

        assert!(unlock_file(&artifact, &mut keys).is_err());
        assert_eq!(names(tmp.path()), vec!["doc.txt", "doc.txt.dma"]);
        assert_eq!(std::fs::read(&src).unwrap(), b"v2");
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_carried_over() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("script.sh");
        std::fs::write(&src, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&src, Permissions::from_mode(0o750)).unwrap();
        let mut keys = ring("pw");

        let artifact = lock_file(&src, &mut keys).unwrap();
        let mode = std::fs::metadata(&artifact).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);

        unlock_file(&artifact, &mut keys).unwrap();
        let mode = std::fs::metadata(&src).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
