//! Owner password to artifact key, via Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{KEY_SIZE, SALT_SIZE};

/// Hard upper bounds on Argon2id cost (2 GiB, 64 passes, 64 lanes).
/// The key ring applies a much tighter, configuration-relative limit.
pub const MAX_MEM_COST_KIB: u32 = 2 * 1024 * 1024;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 64;

/// Symmetric key for a job's artifacts. Wiped when dropped, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Argon2id cost, recorded in every artifact header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KdfParams {
    pub mem_cost_kib: u32,
    /// Passes over memory
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl From<&foldlock_core::config::KdfConfig> for KdfParams {
    fn from(config: &foldlock_core::config::KdfConfig) -> Self {
        Self {
            mem_cost_kib: config.mem_cost_kib,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
        }
    }
}

impl KdfParams {
    /// Reject costs Argon2 would refuse or that exceed the hard bounds.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            anyhow::bail!("Argon2id parallelism out of range: {}", self.parallelism);
        }
        if self.time_cost == 0 || self.time_cost > MAX_TIME_COST {
            anyhow::bail!("Argon2id time cost out of range: {}", self.time_cost);
        }
        if self.mem_cost_kib < 8 * self.parallelism || self.mem_cost_kib > MAX_MEM_COST_KIB {
            anyhow::bail!("Argon2id memory cost out of range: {} KiB", self.mem_cost_kib);
        }
        Ok(())
    }
}

/// Stretch the owner password into an artifact key.
///
/// `salt` is public; it travels in every artifact header sealed with it.
pub fn derive_master_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> anyhow::Result<MasterKey> {
    params.check()?;
    let cost = Params::new(params.mem_cost_kib, params.time_cost, params.parallelism, Some(KEY_SIZE))
        .map_err(|e| anyhow::anyhow!("Argon2id rejected cost {params:?}: {e}"))?;

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, cost)
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut *out)
        .map_err(|e| anyhow::anyhow!("deriving artifact key: {e}"))?;
    Ok(MasterKey::from_bytes(*out))
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}
