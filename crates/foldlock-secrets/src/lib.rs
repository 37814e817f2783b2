//! foldlock-secrets: owner record persistence and the TOTP unlock gate
//!
//! The owner record (`{password, totpSecret, configured}`) is the single
//! source of truth for whether the locker is usable. It sits behind the
//! [`SecretStore`] trait; [`ConfigurationStore`] keeps it as a JSON file.
//!
//! The TOTP secret only gates unlocks. File keys always come from the
//! stored password.

pub mod store;
pub mod totp;

pub use store::{ConfigurationStore, MemoryStore, OwnerConfig, SecretStore};
pub use totp::{code_at, generate_secret, provisioning_uri, unix_now, validate};
