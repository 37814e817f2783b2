//! foldlock-crypto: per-file encryption for the folder locker
//!
//! Pipeline: plaintext → zstd compress → XChaCha20-Poly1305 → `<name>.dma`
//!
//! Key handling:
//! ```text
//! Owner password
//!   └── Argon2id(password, salt, params) → 256-bit key   (once per job per salt)
//!         └── AEAD: XChaCha20-Poly1305 (nonce=random_192bit, AAD=artifact header)
//! ```
//!
//! The salt and Argon2id parameters travel in the artifact header, so any
//! artifact opens with the password alone.

pub mod container;
pub mod file;
pub mod kdf;
pub mod keyring;

pub use container::{open, seal, Header};
pub use file::{lock_file, unlock_file};
pub use kdf::{derive_master_key, KdfParams, MasterKey};
pub use keyring::KeyRing;

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-artifact Argon2id salt
pub const SALT_SIZE: usize = 16;
