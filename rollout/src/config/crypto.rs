//! Field-level encryption for sensitive configuration values
//!
//! Envelope format: `encrypted:<iv hex>:<tag hex>:<ciphertext hex>` using
//! AES-256-GCM. The key is the SHA-256 digest of the configured passphrase.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::errors::RolloutError;

pub const ENVELOPE_PREFIX: &str = "encrypted:";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// True if `value` looks like an envelope (prefix only, not validated)
pub fn is_envelope(value: &str) -> bool {
    value.starts_with(ENVELOPE_PREFIX)
}

/// Decoded envelope parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Parse the four-part envelope; any structural problem is
    /// [`RolloutError::InvalidEncryptedFormat`]
    pub fn parse(text: &str) -> Result<Self, RolloutError> {
        let body = text
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(RolloutError::InvalidEncryptedFormat)?;

        let parts: Vec<&str> = body.split(':').collect();
        let [iv, tag, ciphertext] = parts.as_slice() else {
            return Err(RolloutError::InvalidEncryptedFormat);
        };

        let decode = |part: &str| hex::decode(part).map_err(|_| RolloutError::InvalidEncryptedFormat);
        let envelope = Self {
            iv: decode(iv)?,
            tag: decode(tag)?,
            ciphertext: decode(ciphertext)?,
        };

        if envelope.iv.len() != IV_LEN || envelope.tag.len() != TAG_LEN {
            return Err(RolloutError::InvalidEncryptedFormat);
        }
        Ok(envelope)
    }

    fn encode(&self) -> String {
        format!(
            "{}{}:{}:{}",
            ENVELOPE_PREFIX,
            hex::encode(&self.iv),
            hex::encode(&self.tag),
            hex::encode(&self.ciphertext)
        )
    }
}

/// AES-256-GCM cipher keyed from a passphrase
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}

impl FieldCipher {
    pub fn from_passphrase(passphrase: &SecretString) -> Result<Self, RolloutError> {
        let key = Sha256::digest(passphrase.expose_secret().as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| RolloutError::Crypto(format!("failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, RolloutError> {
        let mut iv = [0u8; IV_LEN];
        rand::fill(&mut iv);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| RolloutError::Crypto(format!("encryption failed: {e}")))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(Envelope {
            iv: iv.to_vec(),
            tag: tag.to_vec(),
            ciphertext: ciphertext.to_vec(),
        }
        .encode())
    }

    pub fn decrypt(&self, text: &str) -> Result<String, RolloutError> {
        let envelope = Envelope::parse(text)?;
        self.open(&envelope)
    }

    pub fn open(&self, envelope: &Envelope) -> Result<String, RolloutError> {
        let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&envelope.ciphertext);
        sealed.extend_from_slice(&envelope.tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&envelope.iv), sealed.as_ref())
            .map_err(|_| {
                RolloutError::Crypto("decryption failed (wrong key or corrupted data)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| RolloutError::Crypto(format!("decrypted value is not UTF-8: {e}")))
    }
}
