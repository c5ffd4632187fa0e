use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    /// Tag mismatch: wrong password, wrong recipient key, or tampering.
    #[error("Authentication failed (tag mismatch: wrong key or tampered ciphertext)")]
    AuthenticationFailure,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl CryptoError {
    /// True for failures caused by a structurally broken input rather than a
    /// failed tag check.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CryptoError::MalformedEnvelope(_) | CryptoError::Base64Decode(_) | CryptoError::InvalidKey(_)
        )
    }
}
