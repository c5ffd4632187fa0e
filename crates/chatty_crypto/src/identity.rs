//! Identity key management
//!
//! Each user has exactly one long-term `IdentityKeyPair`: an ECDH keypair on
//! NIST P-256. The public half is published to the relay and is what other
//! members wrap chat keys for. The private half never leaves the device
//! unencrypted; see [`crate::vault`] for the password envelope around it.
//!
//! Wire encodings
//! --------------
//! - Public key:  SEC1 uncompressed point (65 bytes), base64.
//! - Private key: 32-byte big-endian scalar (only ever inside an envelope).

use base64::{engine::general_purpose::STANDARD, Engine};
use p256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Length of an uncompressed SEC1 P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;
pub const SECRET_KEY_LEN: usize = 32;

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// Serialized P-256 public key (SEC1 uncompressed), base64 on the wire.
///
/// Only constructible from a validated curve point, so the encoding is
/// always 33 or 65 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub(crate) Vec<u8>);

impl PublicKeyBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_sec1(&bytes)
    }

    /// Validate that `bytes` is a point on the curve before accepting it.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, CryptoError> {
        PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| CryptoError::InvalidKey(format!("not a P-256 public key ({} bytes)", bytes.len())))?;
        Ok(Self(bytes.to_vec()))
    }

    pub(crate) fn from_public_key(public: &PublicKey) -> Self {
        Self(public.to_encoded_point(false).as_bytes().to_vec())
    }

    pub(crate) fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_sec1_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidKey("not a P-256 public key".into()))
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// Long-term identity key agreement keypair. `SecretKey` zeroizes itself on drop.
#[derive(Clone)]
pub struct IdentityKeyPair {
    pub public: PublicKeyBytes,
    secret: SecretKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = PublicKeyBytes::from_public_key(&secret.public_key());
        Self { public, secret }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "Identity key must be {SECRET_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey("scalar out of range for P-256".into()))?;
        let public = PublicKeyBytes::from_public_key(&secret.public_key());
        Ok(Self { public, secret })
    }

    /// Serialized private scalar. Only ever fed into the password envelope.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret.to_bytes().to_vec())
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public.to_b64())
            .finish_non_exhaustive()
    }
}
