use std::path::{Path, PathBuf};
use thiserror::Error;

pub type LockerResult<T> = Result<T, LockerError>;

#[derive(Debug, Error)]
pub enum LockerError {
    /// No owner record exists (or it is incomplete). Raised before any I/O.
    #[error("folder locker is not configured; run setup first")]
    NotConfigured,

    /// The one-time code did not validate. Raised before any I/O.
    #[error("one-time code is wrong or expired")]
    Unauthorized,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("crypto error on {}: {reason}", path.display())]
    Crypto { path: PathBuf, reason: String },

    #[error("invalid password: {0}")]
    InvalidPassword(String),

    #[error("folder locker is already configured; reset it first")]
    AlreadyConfigured,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LockerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        LockerError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn crypto(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        LockerError::Crypto {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// True for the pre-flight refusals that guarantee nothing was touched.
    pub fn is_preflight(&self) -> bool {
        matches!(self, LockerError::NotConfigured | LockerError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = LockerError::io(
            "/tmp/a.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.txt"), "got: {msg}");
        assert!(msg.contains("gone"), "got: {msg}");
    }

    #[test]
    fn test_preflight_classification() {
        assert!(LockerError::NotConfigured.is_preflight());
        assert!(LockerError::Unauthorized.is_preflight());
        assert!(!LockerError::crypto("x.dma", "tag mismatch").is_preflight());
    }
}
