//! Message cipher: chat text under the shared 32-byte chat key.
//!
//! Wire format (base64 on the wire):
//!   [ iv (12 bytes) | ciphertext + tag ]
//!
//! No derivation happens here; the chat key is used as-is.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use zeroize::ZeroizeOnDrop;

use crate::{aead, error::CryptoError};

pub const CHAT_KEY_LEN: usize = 32;

/// Symmetric key shared by every member of one chat. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct ChatKey([u8; CHAT_KEY_LEN]);

impl ChatKey {
    /// Mint a fresh random chat key. Only done once, at chat creation.
    pub fn generate() -> Self {
        let mut key = [0u8; CHAT_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; CHAT_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("chat key must be {CHAT_KEY_LEN} bytes, got {}", bytes.len())))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; CHAT_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ChatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChatKey(..)")
    }
}

/// Encrypt message text; returns base64 `iv || ciphertext`.
pub fn encrypt(plaintext: &str, key: &ChatKey) -> Result<String, CryptoError> {
    let wire = aead::encrypt(key.as_bytes(), plaintext.as_bytes())?;
    Ok(STANDARD.encode(wire))
}

/// Decrypt base64 `iv || ciphertext` back to text.
pub fn decrypt(ciphertext_b64: &str, key: &ChatKey) -> Result<String, CryptoError> {
    let wire = STANDARD.decode(ciphertext_b64.trim())?;
    let plaintext = aead::decrypt(key.as_bytes(), &wire)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::MalformedEnvelope("decrypted message is not UTF-8".into()))
}
