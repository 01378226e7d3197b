//! OS secret-store access behind a small capability trait.
//!
//! The data-encryption key never touches the token file; it lives in the
//! platform credential manager (Keychain, Credential Manager, Secret
//! Service). The trait keeps the rest of the auth code testable against an
//! in-memory backend.

use std::collections::HashMap;
use std::sync::Mutex;

use super::error::AuthError;

/// Minimal get/set/delete capability over named secrets.
///
/// Calls are blocking I/O to an OS service; callers tolerate their latency.
pub trait SecretBackend: Send + Sync {
    /// Fetch a secret, `None` when no entry exists.
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, AuthError>;
    /// Store a secret, overwriting any existing entry.
    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), AuthError>;
    /// Delete a secret. Returns `true` when an entry was removed; a missing
    /// entry is not an error.
    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError>;
}

/// Production backend over the platform keyring.
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, AuthError> {
        keyring::Entry::new(service, account)
            .map_err(|err| AuthError::Secret(format!("failed to open keyring entry: {err}")))
    }
}

impl SecretBackend for KeyringBackend {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, AuthError> {
        match Self::entry(service, account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(AuthError::Secret(format!(
                "failed to read `{account}` from keyring: {err}"
            ))),
        }
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), AuthError> {
        Self::entry(service, account)?
            .set_password(value)
            .map_err(|err| {
                AuthError::Secret(format!("failed to write `{account}` to keyring: {err}"))
            })
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(AuthError::Secret(format!(
                "failed to delete `{account}` from keyring: {err}"
            ))),
        }
    }
}

/// In-memory backend for tests and ephemeral environments without an OS
/// credential manager.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemoryBackend {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, AuthError> {
        let entries = self.entries.lock().expect("secret map poisoned");
        Ok(entries.get(&(service.to_string(), account.to_string())).cloned())
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().expect("secret map poisoned");
        entries.insert((service.to_string(), account.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError> {
        let mut entries = self.entries.lock().expect("secret map poisoned");
        Ok(entries
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trips_and_overwrites() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("svc", "key").unwrap(), None);

        backend.set("svc", "key", "v1").unwrap();
        assert_eq!(backend.get("svc", "key").unwrap().as_deref(), Some("v1"));

        backend.set("svc", "key", "v2").unwrap();
        assert_eq!(backend.get("svc", "key").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn memory_backend_delete_reports_presence() {
        let backend = MemoryBackend::new();
        backend.set("svc", "key", "v").unwrap();
        assert!(backend.delete("svc", "key").unwrap());
        assert!(!backend.delete("svc", "key").unwrap());
        assert_eq!(backend.get("svc", "key").unwrap(), None);
    }

    #[test]
    fn entries_are_scoped_by_service_and_account() {
        let backend = MemoryBackend::new();
        backend.set("svc-a", "key", "a").unwrap();
        backend.set("svc-b", "key", "b").unwrap();
        assert_eq!(backend.get("svc-a", "key").unwrap().as_deref(), Some("a"));
        assert_eq!(backend.get("svc-b", "key").unwrap().as_deref(), Some("b"));
        assert_eq!(backend.get("svc-a", "other").unwrap(), None);
    }
}
