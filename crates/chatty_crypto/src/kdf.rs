//! Key derivation functions
//!
//! `password_key`: PBKDF2-HMAC-SHA256, derives the 32-byte key that seals
//!   the identity private key.
//!
//! `hkdf_expand`: HKDF-SHA256, turns an ECDH shared secret into a one-time
//!   wrapping key.

use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;

/// Floor for the PBKDF2 iteration count. Envelopes are never sealed below it.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Hash name recorded in every password envelope.
pub const PBKDF2_HASH: &str = "SHA-256";

// ── Password key (PBKDF2) ─────────────────────────────────────────────────────

/// 32-byte key derived from a user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct PasswordKey(pub [u8; 32]);

/// Derive a key from a password + 16-byte salt.
/// The salt travels in clear next to the ciphertext it protects.
pub fn password_key(password: &[u8], salt: &[u8; SALT_LEN], iterations: u32) -> Result<PasswordKey, CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::KeyDerivation("iteration count must be non-zero".into()));
    }
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
    Ok(PasswordKey(output))
}

/// Generate a fresh random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive the 32-byte AES key for one hybrid wrap from an ECDH shared secret.
/// The ephemeral public key is bound into `info` so a key is never reused
/// across two different ephemeral points.
pub fn wrap_key_from_shared_secret(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut info = Vec::with_capacity(13 + ephemeral_public.len());
    info.extend_from_slice(b"chat-key-wrap");
    info.extend_from_slice(ephemeral_public);

    let mut key = Zeroizing::new([0u8; 32]);
    hkdf_expand(shared_secret, Some(b"chatty-hybrid-v1"), &info, &mut key[..])?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_key_is_deterministic_per_salt() {
        let salt = [9u8; SALT_LEN];
        let a = password_key(b"hunter2", &salt, 1_000).unwrap();
        let b = password_key(b"hunter2", &salt, 1_000).unwrap();
        assert_eq!(a.0, b.0);

        let c = password_key(b"hunter2", &[8u8; SALT_LEN], 1_000).unwrap();
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn pbkdf2_sha256_known_answer() {
        // RFC 7914 §11 test vector for PBKDF2-HMAC-SHA256 (first 32 bytes).
        let mut out = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(password_key(b"pw", &[0u8; SALT_LEN], 0).is_err());
    }
}
