//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM (96-bit IV).
//! Key size: 32 bytes.  IV: 12 bytes (random).  Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   [ iv (12 bytes) | ciphertext + tag ]

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with an explicit IV. Returns ciphertext+tag
/// only; the caller decides where the IV goes on the wire.
pub fn seal(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(&Nonce::from(*iv), plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt ciphertext+tag produced by [`seal`].
pub fn open(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "ciphertext shorter than the {TAG_LEN}-byte tag ({} bytes)",
            ciphertext.len()
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AuthenticationFailure)?;
    let plaintext = cipher
        .decrypt(&Nonce::from(*iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt `plaintext` with a 32-byte key, prepending a random 12-byte IV.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = generate_iv();
    let ciphertext = seal(key, &iv, plaintext)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (iv || ciphertext+tag).
pub fn decrypt(key: &[u8; KEY_LEN], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let (iv, ciphertext) = split_iv(data)?;
    open(key, &iv, ciphertext)
}

/// Split `iv || rest`, rejecting buffers too short to hold the IV.
pub fn split_iv(data: &[u8]) -> Result<([u8; IV_LEN], &[u8]), CryptoError> {
    if data.len() < IV_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "need at least {IV_LEN} bytes for the IV, got {}",
            data.len()
        )));
    }
    let (iv_bytes, rest) = data.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);
    Ok((iv, rest))
}
