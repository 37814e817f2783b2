//! Owner record persistence.
//!
//! The record is a small JSON file:
//! ```json
//! {"password": "...", "totpSecret": "...", "configured": true}
//! ```
//! The password is kept in clear form because it is the KDF input for every
//! artifact. It lives behind [`SecretStore`] so a platform keystore backend
//! can replace the file without touching the engine.

use anyhow::Context;
use foldlock_core::{LockerError, LockerResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The single owner identity of an installation
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct OwnerConfig {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub totp_secret: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub configured: bool,
}

impl OwnerConfig {
    pub fn new(password: impl Into<String>, totp_secret: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            totp_secret: totp_secret.into(),
            configured: true,
        }
    }

    /// Usable only when flagged configured and both secrets are present.
    pub fn is_configured(&self) -> bool {
        self.configured && !self.password.is_empty() && !self.totp_secret.is_empty()
    }
}

impl std::fmt::Debug for OwnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerConfig")
            .field("password", &"[REDACTED]")
            .field("totp_secret", &"[REDACTED]")
            .field("configured", &self.configured)
            .finish()
    }
}

/// Narrow interface over wherever the owner record lives.
pub trait SecretStore: Send + Sync {
    /// The current record; unconfigured when none exists.
    fn load(&self) -> OwnerConfig;
    /// Overwrite the record.
    fn save(&self, config: &OwnerConfig) -> LockerResult<()>;
    /// Delete the record.
    fn reset(&self) -> LockerResult<()>;
    /// Drop any cached copy and re-read the backing storage.
    fn reload(&self) -> OwnerConfig;
}

impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    fn load(&self) -> OwnerConfig {
        (**self).load()
    }

    fn save(&self, config: &OwnerConfig) -> LockerResult<()> {
        (**self).save(config)
    }

    fn reset(&self) -> LockerResult<()> {
        (**self).reset()
    }

    fn reload(&self) -> OwnerConfig {
        (**self).reload()
    }
}

/// File-backed owner record with an in-memory cache
pub struct ConfigurationStore {
    path: PathBuf,
    cache: Mutex<Option<OwnerConfig>>,
}

impl ConfigurationStore {
    /// Nothing is read until the first `load()`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cache(&self) -> MutexGuard<'_, Option<OwnerConfig>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_record(&self, config: &OwnerConfig) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config dir: {}", dir.display()))?;

        let mut json = serde_json::to_vec_pretty(config).context("serializing owner record")?;

        // The temp file is owner-only from creation; it is removed if anything below fails
        let mut tmp = private_temp(dir)?;
        let written = tmp.write_all(&json).and_then(|()| tmp.as_file().sync_all());
        json.zeroize();
        written.with_context(|| format!("writing owner record temp: {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing owner record: {}", self.path.display()))?;
        Ok(())
    }
}

impl SecretStore for ConfigurationStore {
    fn load(&self) -> OwnerConfig {
        let mut cache = self.cache();
        if let Some(config) = cache.as_ref() {
            return config.clone();
        }
        let config = read_record(&self.path);
        *cache = Some(config.clone());
        config
    }

    fn save(&self, config: &OwnerConfig) -> LockerResult<()> {
        self.write_record(config)
            .map_err(|e| LockerError::Config(format!("{e:#}")))?;
        *self.cache() = Some(config.clone());
        tracing::info!(path = %self.path.display(), "owner record saved");
        Ok(())
    }

    fn reset(&self) -> LockerResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "owner record deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "owner record already absent");
            }
            Err(e) => return Err(LockerError::io(&self.path, e)),
        }
        *self.cache() = Some(OwnerConfig::default());
        Ok(())
    }

    fn reload(&self) -> OwnerConfig {
        let config = read_record(&self.path);
        *self.cache() = Some(config.clone());
        config
    }
}

/// Read the record, falling back to an unconfigured value on any failure.
fn read_record(path: &Path) -> OwnerConfig {
    let mut bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return OwnerConfig::default(),
        Err(e) => {
            tracing::warn!("reading owner record {}: {e}", path.display());
            return OwnerConfig::default();
        }
    };
    let parsed = serde_json::from_slice::<OwnerConfig>(&bytes);
    bytes.zeroize();
    match parsed {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("owner record {} is unreadable, treating as unconfigured: {e}", path.display());
            OwnerConfig::default()
        }
    }
}

/// Hidden temp file next to the record, readable by the owner only.
fn private_temp(dir: &Path) -> anyhow::Result<NamedTempFile> {
    let tmp = tempfile::Builder::new()
        .prefix(".owner-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("creating owner record temp in {}", dir.display()))?;
    restrict_permissions(tmp.as_file())?;
    Ok(tmp)
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .context("restricting owner record permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> anyhow::Result<()> {
    Ok(())
}

/// Owner record held only in memory (tests, embedding hosts)
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<OwnerConfig>,
}

impl MemoryStore {
    pub fn new(config: OwnerConfig) -> Self {
        Self {
            record: Mutex::new(config),
        }
    }

    fn record(&self) -> MutexGuard<'_, OwnerConfig> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn load(&self) -> OwnerConfig {
        self.record().clone()
    }

    fn save(&self, config: &OwnerConfig) -> LockerResult<()> {
        *self.record() = config.clone();
        Ok(())
    }

    fn reset(&self) -> LockerResult<()> {
        *self.record() = OwnerConfig::default();
        Ok(())
    }

    fn reload(&self) -> OwnerConfig {
        self.load()
    }
}
