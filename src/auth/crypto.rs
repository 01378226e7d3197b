//! Envelope encryption for the on-disk token file.
//!
//! Every save generates a fresh 32-byte data-encryption key, stores it in
//! the OS secret store, and AES-256-GCM encrypts the JSON payload under a
//! random 16-byte IV. Only the most recently written key exists, so older
//! envelopes become unreadable after the next save; that rotation is a
//! deliberate property of the design.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, KeyInit, Nonce, Tag};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::AuthError;
use super::secret::SecretBackend;

/// AES-256-GCM with the 16-byte IV the envelope format uses.
type EnvelopeCipher = AesGcm<Aes256, U16>;

pub(crate) const DATA_KEY_LEN: usize = 32;
pub(crate) const ENVELOPE_IV_LEN: usize = 16;
pub(crate) const ENVELOPE_TAG_LEN: usize = 16;
/// Fixed secret-store account holding the data-encryption key.
pub(crate) const DATA_KEY_ACCOUNT: &str = "encryption-key";

/// The only on-disk representation of tokens: IV, ciphertext, and GCM auth
/// tag, each hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub iv: String,
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
    #[serde(rename = "authTag")]
    pub auth_tag: String,
}

/// Envelope-encryption primitive over a [`SecretBackend`]-held key.
#[derive(Clone)]
pub struct CryptoBox {
    secrets: Arc<dyn SecretBackend>,
    service: String,
}

impl CryptoBox {
    pub fn new(secrets: Arc<dyn SecretBackend>, service: impl Into<String>) -> Self {
        Self {
            secrets,
            service: service.into(),
        }
    }

    /// Encrypt `payload` under a freshly generated data key.
    ///
    /// Side effect: the new key overwrites any previously stored one, so
    /// earlier envelopes can no longer be decrypted.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<EncryptedEnvelope, AuthError> {
        let mut key = [0u8; DATA_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        self.secrets
            .set(&self.service, DATA_KEY_ACCOUNT, &hex::encode(key))?;

        let mut iv = [0u8; ENVELOPE_IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher = EnvelopeCipher::new_from_slice(&key)
            .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
        let mut buffer = serde_json::to_vec(payload)
            .map_err(|err| AuthError::Invalid(format!("failed to serialize tokens: {err}")))?;
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| AuthError::Invalid("failed to encrypt token payload".to_string()))?;

        Ok(EncryptedEnvelope {
            iv: hex::encode(iv),
            encrypted_data: hex::encode(buffer),
            auth_tag: hex::encode(tag),
        })
    }

    /// Decrypt an envelope with the currently stored data key.
    ///
    /// A missing key means "no usable credentials" and decodes to `None`.
    /// A tag-verification failure is [`AuthError::DecryptionFailed`]; no
    /// partially decrypted data ever escapes.
    pub fn decrypt<T: DeserializeOwned>(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<Option<T>, AuthError> {
        let Some(key_hex) = self.secrets.get(&self.service, DATA_KEY_ACCOUNT)? else {
            tracing::debug!("no data-encryption key in secret store");
            return Ok(None);
        };
        let key = decode_fixed::<DATA_KEY_LEN>(&key_hex, "encryption key")?;
        let iv = decode_fixed::<ENVELOPE_IV_LEN>(&envelope.iv, "iv")?;
        let tag = decode_fixed::<ENVELOPE_TAG_LEN>(&envelope.auth_tag, "authTag")?;
        let mut buffer = hex::decode(&envelope.encrypted_data)
            .map_err(|err| AuthError::Invalid(format!("invalid encryptedData hex: {err}")))?;

        let cipher = EnvelopeCipher::new_from_slice(&key)
            .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| AuthError::DecryptionFailed)?;

        let payload = serde_json::from_slice(&buffer)
            .map_err(|err| AuthError::Invalid(format!("failed to decode token payload: {err}")))?;
        Ok(Some(payload))
    }

    /// Remove the stored data key. Returns `true` when a key existed.
    pub fn delete_key(&self) -> Result<bool, AuthError> {
        self.secrets.delete(&self.service, DATA_KEY_ACCOUNT)
    }
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N], AuthError> {
    let bytes = hex::decode(value)
        .map_err(|err| AuthError::Invalid(format!("invalid {field} hex: {err}")))?;
    if bytes.len() != N {
        return Err(AuthError::Invalid(format!(
            "invalid {field} length: expected {N} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}
