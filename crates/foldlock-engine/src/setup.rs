//! First-run owner setup and reset.

use foldlock_core::{LockerError, LockerResult};
use foldlock_secrets::{generate_secret, provisioning_uri, OwnerConfig, SecretStore};
use zeroize::Zeroizing;

/// What the owner needs to enrol an authenticator app
#[derive(Clone)]
pub struct SetupOutcome {
    pub secret: Zeroizing<String>,
    pub provisioning_uri: Zeroizing<String>,
}

impl std::fmt::Debug for SetupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOutcome").finish_non_exhaustive()
    }
}

/// Create the owner record with a fresh TOTP secret.
pub fn setup<S: SecretStore + ?Sized>(
    store: &S,
    password: &str,
    confirmation: &str,
    account: &str,
    issuer: &str,
) -> LockerResult<SetupOutcome> {
    if password.trim().is_empty() {
        return Err(LockerError::InvalidPassword("password must not be empty".into()));
    }
    if password != confirmation {
        return Err(LockerError::InvalidPassword("passwords do not match".into()));
    }
    if store.load().is_configured() {
        return Err(LockerError::AlreadyConfigured);
    }

    let secret = Zeroizing::new(generate_secret());
    store.save(&OwnerConfig::new(password, secret.as_str()))?;
    tracing::info!(account, issuer, "owner configured");

    let uri = provisioning_uri(&secret, account, issuer);
    Ok(SetupOutcome {
        secret,
        provisioning_uri: Zeroizing::new(uri),
    })
}

/// Provisioning URI for the configured owner, so it can be enrolled again.
pub fn existing_provisioning<S: SecretStore + ?Sized>(
    store: &S,
    account: &str,
    issuer: &str,
) -> Option<Zeroizing<String>> {
    let owner = store.load();
    owner
        .is_configured()
        .then(|| Zeroizing::new(provisioning_uri(&owner.totp_secret, account, issuer)))
}

/// Forget the owner. Locked files stay locked until setup runs again with
/// the same password.
pub fn reset<S: SecretStore + ?Sized>(store: &S) -> LockerResult<()> {
    store.reset()?;
    tracing::info!("owner record reset");
    Ok(())
}
