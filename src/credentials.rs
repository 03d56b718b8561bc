//! Secure credential storage via the OS keychain.
//!
//! At startup, [`populate_env_from_keychain`] copies any stored Kraken
//! credentials into environment variables so [`crate::config::fetch_config`]
//! picks them up transparently.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "krakenlink";

/// Known API credential keys managed by this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKey {
    KrakenApiKey,
    KrakenApiSecret,
}

impl CredentialKey {
    /// Returns the keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::KrakenApiKey => "kraken_api_key",
            Self::KrakenApiSecret => "kraken_api_secret",
        }
    }

    /// Returns the environment variable name for this credential.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::KrakenApiKey => "KRAKEN_API_KEY",
            Self::KrakenApiSecret => "KRAKEN_API_SECRET",
        }
    }

    /// All credential keys.
    pub const ALL: [CredentialKey; 2] = [Self::KrakenApiKey, Self::KrakenApiSecret];
}

/// Loads a credential from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Populates `KRAKEN_API_KEY` and `KRAKEN_API_SECRET` from the keychain.
///
/// Both are written or neither: the config loader rejects a key without
/// its secret, so a half-stored pair is left alone and logged. Variables
/// already present in the environment take precedence.
///
/// Call this at startup, before the tokio runtime spawns worker tasks.
pub fn populate_env_from_keychain() {
    let missing: Vec<CredentialKey> = CredentialKey::ALL
        .into_iter()
        .filter(|key| std::env::var(key.env_var()).is_err())
        .collect();
    if missing.len() != CredentialKey::ALL.len() {
        return;
    }

    let loaded: Vec<(CredentialKey, Zeroizing<String>)> = missing
        .into_iter()
        .filter_map(|key| load(key).map(|value| (key, value)))
        .collect();
    match loaded.len() {
        0 => debug!("no Kraken credentials in keychain"),
        n if n == CredentialKey::ALL.len() => {
            for (key, value) in &loaded {
                debug!(key = key.env_var(), "loaded credential from keychain");
                // SAFETY: called before any other thread reads the environment.
                unsafe {
                    std::env::set_var(key.env_var(), value.as_str());
                }
            }
        }
        _ => warn!("keychain holds only part of the Kraken credentials, ignoring"),
    }
}
