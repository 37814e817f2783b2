//! Per-job key cache.
//!
//! A `KeyRing` is built once per lock/unlock job. Sealing uses a single random
//! salt for the ring's lifetime, so the expensive Argon2id derivation runs
//! once per job. Opening derives one key per distinct `(params, salt)` found
//! in artifact headers and reuses it for every artifact that shares them.
//!
//! Header parameters are not authenticated until after the derivation, so
//! the ring refuses any that exceed its own configured cost by more than
//! [`MAX_COST_FACTOR`] before committing memory or CPU to them.

use rand::RngCore;
use secrecy::SecretString;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::kdf::{derive_master_key, KdfParams, MasterKey};
use crate::SALT_SIZE;

/// How far an artifact's Argon2id cost may exceed the ring's own, per field
pub const MAX_COST_FACTOR: u32 = 4;

pub struct KeyRing {
    password: SecretString,
    params: KdfParams,
    sealing_salt: Option<[u8; SALT_SIZE]>,
    derived: HashMap<(KdfParams, [u8; SALT_SIZE]), MasterKey>,
}

impl KeyRing {
    pub fn new(password: SecretString, params: KdfParams) -> Self {
        Self {
            password,
            params,
            sealing_salt: None,
            derived: HashMap::new(),
        }
    }

    /// Parameters used for newly sealed artifacts
    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Largest cost the ring will derive a key for
    pub fn ceiling(&self) -> KdfParams {
        KdfParams {
            mem_cost_kib: self.params.mem_cost_kib.saturating_mul(MAX_COST_FACTOR),
            time_cost: self.params.time_cost.saturating_mul(MAX_COST_FACTOR),
            parallelism: self.params.parallelism.saturating_mul(MAX_COST_FACTOR),
        }
    }

    /// Number of Argon2id derivations performed so far
    pub fn derivations(&self) -> usize {
        self.derived.len()
    }

    /// Salt and key for sealing; derived on first use.
    pub fn sealing_key(&mut self) -> anyhow::Result<([u8; SALT_SIZE], &MasterKey)> {
        let salt = match self.sealing_salt {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; SALT_SIZE];
                rand::thread_rng().fill_bytes(&mut salt);
                self.sealing_salt = Some(salt);
                salt
            }
        };
        let params = self.params;
        let key = self.key_for(&params, &salt)?;
        Ok((salt, key))
    }

    /// Key for an artifact sealed with `params` and `salt`.
    pub fn key_for(&mut self, params: &KdfParams, salt: &[u8; SALT_SIZE]) -> anyhow::Result<&MasterKey> {
        let ceiling = self.ceiling();
        if params.mem_cost_kib > ceiling.mem_cost_kib
            || params.time_cost > ceiling.time_cost
            || params.parallelism > ceiling.parallelism
        {
            anyhow::bail!(
                "artifact KDF cost ({} KiB, t={}, p={}) exceeds the configured limit ({} KiB, t={}, p={})",
                params.mem_cost_kib,
                params.time_cost,
                params.parallelism,
                ceiling.mem_cost_kib,
                ceiling.time_cost,
                ceiling.parallelism,
            );
        }

        match self.derived.entry((*params, *salt)) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let key = derive_master_key(&self.password, salt, params)?;
                tracing::debug!(
                    mem_cost_kib = params.mem_cost_kib,
                    time_cost = params.time_cost,
                    parallelism = params.parallelism,
                    "derived artifact key"
                );
                Ok(slot.insert(key))
            }
        }
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("params", &self.params)
            .field("derivations", &self.derived.len())
            .finish_non_exhaustive()
    }
}
