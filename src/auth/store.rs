//! Persistent encrypted token storage.
//!
//! The store exclusively owns the token file path. Writes go through a
//! temp-file-then-rename so a crash mid-save never leaves a torn file;
//! the directory is created 0700 and the file written 0600.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::crypto::{CryptoBox, EncryptedEnvelope};
use super::error::AuthError;
use super::secret::SecretBackend;
use super::types::{TokenPair, TokenRefresh};
use crate::config::SERVICE_NAME;

/// Encrypted token store composed from [`CryptoBox`] and a [`SecretBackend`].
#[derive(Clone)]
pub struct TokenStore {
    path: PathBuf,
    crypto: CryptoBox,
}

impl TokenStore {
    /// Store bound to `path` with the data key kept under [`SERVICE_NAME`].
    pub fn new(path: PathBuf, secrets: Arc<dyn SecretBackend>) -> Self {
        Self::with_service(path, secrets, SERVICE_NAME)
    }

    /// Store with an explicit secret-store service name (used by tests to
    /// isolate key entries).
    pub fn with_service(
        path: PathBuf,
        secrets: Arc<dyn SecretBackend>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            crypto: CryptoBox::new(secrets, service),
            path,
        }
    }

    /// Encrypt and persist a token pair stamped with the current time.
    pub fn save(&self, access_token: &str, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let pair = TokenPair::new(access_token, refresh_token);
        let envelope = self.crypto.encrypt(&pair)?;
        self.write_envelope(&envelope)?;
        tracing::debug!(path = %self.path.display(), "saved encrypted tokens");
        Ok(pair)
    }

    /// Load the saved token pair.
    ///
    /// Any failure (missing file, malformed JSON, missing key, tampered
    /// envelope) reads as "not logged in" rather than an error; callers
    /// treat `None` uniformly.
    pub fn get(&self) -> Option<TokenPair> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "token file unreadable");
                return None;
            }
        };
        let envelope: EncryptedEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(%err, "token file is not a valid envelope");
                return None;
            }
        };
        match self.crypto.decrypt(&envelope) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::debug!(%err, "token envelope failed to decrypt");
                None
            }
        }
    }

    /// Delete the secret-store key and the token file.
    ///
    /// Each deletion is best-effort and independently ignores an
    /// already-absent entry, so logout is idempotent.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.crypto.delete_key()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err)),
        }
    }

    /// Exchange the saved refresh token for a new pair via `exchange`.
    ///
    /// No saved refresh token is a no-op (`None`). Any exchange failure
    /// clears the whole session and returns `None`: a stale or revoked
    /// refresh token must not leave a present-but-unusable credential file.
    pub async fn refresh<F, Fut>(&self, exchange: F) -> Result<Option<TokenPair>, AuthError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenRefresh, AuthError>>,
    {
        let Some(current) = self.get() else {
            return Ok(None);
        };
        if current.refresh_token.is_empty() {
            return Ok(None);
        }

        match exchange(current.refresh_token).await {
            Ok(new_tokens) => {
                let pair = self.save(&new_tokens.access_token, &new_tokens.refresh_token)?;
                Ok(Some(pair))
            }
            Err(err) => {
                tracing::info!(%err, "token refresh failed; clearing session");
                if let Err(clear_err) = self.clear() {
                    tracing::warn!(%clear_err, "failed to clear session after refresh failure");
                }
                Ok(None)
            }
        }
    }

    /// Path of the token file owned by this store.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn write_envelope(&self, envelope: &EncryptedEnvelope) -> Result<(), AuthError> {
        let Some(parent) = self.path.parent() else {
            return Err(AuthError::Invalid(format!(
                "token file path `{}` has no parent directory",
                self.path.display()
            )));
        };
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
        }

        let text = serde_json::to_string(envelope)
            .map_err(|err| AuthError::Invalid(format!("failed to serialize envelope: {err}")))?;

        // Write a sibling temp file and rename it over the target so a crash
        // mid-write cannot corrupt a previously valid file.
        let tmp_path = parent.join(format!(".codesmooth.json.tmp-{}", std::process::id()));
        let mut options = std::fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);

        if let Err(err) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(AuthError::Io(err));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::secret::MemoryBackend;
    use crate::testsupport::TestTempDir;

    fn temp_store(dir: &TestTempDir) -> TokenStore {
        TokenStore::with_service(
            dir.child("codesmooth.json"),
            Arc::new(MemoryBackend::new()),
            "codesmooth-test",
        )
    }

    #[test]
    fn save_then_get_round_trips() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        let saved = store.save("AT", "RT").unwrap();

        let loaded = store.get().expect("tokens");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.access_token, "AT");
        assert_eq!(loaded.refresh_token, "RT");
    }

    #[test]
    fn token_file_on_disk_is_an_envelope_without_plaintext() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        store.save("secret-access-token", "secret-refresh-token").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"iv\""), "raw: {raw}");
        assert!(raw.contains("\"encryptedData\""));
        assert!(raw.contains("\"authTag\""));
        assert!(!raw.contains("secret-access-token"), "token leaked: {raw}");
    }

    #[cfg(unix)]
    #[test]
    fn directory_and_file_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TestTempDir::new("store");
        let store = TokenStore::with_service(
            dir.child("nested/codesmooth.json"),
            Arc::new(MemoryBackend::new()),
            "codesmooth-test",
        );
        store.save("AT", "RT").unwrap();

        let dir_mode = std::fs::metadata(dir.child("nested")).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700, "dir mode {dir_mode:o}");
        assert_eq!(file_mode & 0o777, 0o600, "file mode {file_mode:o}");
    }

    #[test]
    fn get_returns_none_when_file_missing_or_garbage() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        assert!(store.get().is_none());

        std::fs::write(store.path(), "not json at all").unwrap();
        assert!(store.get().is_none());

        std::fs::write(store.path(), r#"{"iv":"00","encryptedData":"00","authTag":"00"}"#)
            .unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_twice_is_idempotent_and_get_after_clear_is_none() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        store.save("AT", "RT").unwrap();

        store.clear().unwrap();
        assert!(store.get().is_none());
        // Second clear finds nothing to delete and still succeeds.
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn second_save_rotates_key_but_current_file_stays_readable() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        store.save("first-AT", "first-RT").unwrap();
        let first_envelope = std::fs::read_to_string(store.path()).unwrap();

        store.save("second-AT", "second-RT").unwrap();
        let loaded = store.get().expect("tokens");
        assert_eq!(loaded.access_token, "second-AT");

        // Restore the pre-rotation envelope: the rotated key cannot read it.
        std::fs::write(store.path(), first_envelope).unwrap();
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn refresh_without_saved_tokens_is_a_noop() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        let result = store
            .refresh(|_| async { panic!("exchange must not run without tokens") })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn refresh_success_replaces_the_pair() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        store.save("old-AT", "old-RT").unwrap();

        let refreshed = store
            .refresh(|refresh_token| async move {
                assert_eq!(refresh_token, "old-RT");
                Ok(TokenRefresh {
                    access_token: "new-AT".into(),
                    refresh_token: "new-RT".into(),
                })
            })
            .await
            .unwrap()
            .expect("refreshed pair");
        assert_eq!(refreshed.access_token, "new-AT");

        let loaded = store.get().expect("tokens");
        assert_eq!(loaded.refresh_token, "new-RT");
    }

    #[tokio::test]
    async fn refresh_failure_clears_the_whole_session() {
        let dir = TestTempDir::new("store");
        let store = temp_store(&dir);
        store.save("AT", "RT").unwrap();

        let result = store
            .refresh(|_| async {
                Err(AuthError::TokenExchangeFailed("revoked".to_string()))
            })
            .await
            .unwrap();
        assert!(result.is_none());
        // Fail-closed: no file and no readable session remain.
        assert!(store.get().is_none());
        assert!(!store.path().exists());
    }
}
