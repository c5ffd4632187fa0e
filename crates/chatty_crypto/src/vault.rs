//! Identity vault: the password envelope around the identity private key.
//!
//! The relay stores the envelope next to the public key and hands it back
//! on login. Opening it is the only way the private key becomes available
//! to a session, and a failed tag check is the only "wrong password" signal.
//!
//! Envelope wire format (base64 on the wire):
//!   [ salt (16 bytes) | iv (12 bytes) | ciphertext + tag ]
//!
//! The iteration count and hash are protocol parameters, not wire fields;
//! both sides must agree on them out of band.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    aead::{self, IV_LEN, TAG_LEN},
    error::CryptoError,
    identity::IdentityKeyPair,
    kdf::{self, MIN_PBKDF2_ITERATIONS, PBKDF2_HASH, SALT_LEN},
};

/// Sealed identity private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyEnvelope {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub kdf_iterations: u32,
    pub kdf_hash: &'static str,
}

impl PrivateKeyEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse `salt || iv || ciphertext`. `kdf_iterations` must be the count
    /// the envelope was sealed with.
    pub fn from_bytes(bytes: &[u8], kdf_iterations: u32) -> Result<Self, CryptoError> {
        if bytes.len() < SALT_LEN + IV_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "private key envelope too short ({} bytes)",
                bytes.len()
            )));
        }
        let (salt_bytes, rest) = bytes.split_at(SALT_LEN);
        let (iv_bytes, ciphertext) = rest.split_at(IV_LEN);

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(iv_bytes);

        Ok(Self {
            salt,
            iv,
            ciphertext: ciphertext.to_vec(),
            kdf_iterations,
            kdf_hash: PBKDF2_HASH,
        })
    }

    pub fn from_b64(s: &str, kdf_iterations: u32) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes, kdf_iterations)
    }
}

/// Create a brand-new identity keypair.
pub fn generate_identity() -> IdentityKeyPair {
    IdentityKeyPair::generate()
}

/// Seal the identity private key under a key derived from `password`.
pub fn wrap_private_key(
    identity: &IdentityKeyPair,
    password: &[u8],
    kdf_iterations: u32,
) -> Result<PrivateKeyEnvelope, CryptoError> {
    if kdf_iterations < MIN_PBKDF2_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "refusing to seal with {kdf_iterations} iterations (minimum {MIN_PBKDF2_ITERATIONS})"
        )));
    }
    let salt = kdf::generate_salt();
    let key = kdf::password_key(password, &salt, kdf_iterations)?;
    let iv = aead::generate_iv();
    let ciphertext = aead::seal(&key.0, &iv, &identity.secret_bytes())?;

    Ok(PrivateKeyEnvelope {
        salt,
        iv,
        ciphertext,
        kdf_iterations,
        kdf_hash: PBKDF2_HASH,
    })
}

/// Re-derive the key from the embedded salt and open the envelope.
///
/// Returns [`CryptoError::AuthenticationFailure`] for a wrong password or a
/// modified envelope; the two cases are indistinguishable.
pub fn unwrap_private_key(envelope: &PrivateKeyEnvelope, password: &[u8]) -> Result<IdentityKeyPair, CryptoError> {
    let key = kdf::password_key(password, &envelope.salt, envelope.kdf_iterations)?;
    let secret = aead::open(&key.0, &envelope.iv, &envelope.ciphertext)?;
    IdentityKeyPair::from_bytes(&secret)
}
