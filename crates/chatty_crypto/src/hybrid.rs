//! Hybrid (ECIES-style) public-key envelope.
//!
//! Encrypts arbitrary bytes so only the holder of one P-256 private key can
//! read them. Used to hand every chat member their own copy of the chat key.
//!
//! Wrap:
//!   EK   = fresh ephemeral P-256 keypair (one per call, then dropped)
//!   Z    = ECDH(EK_priv, recipient_pub)
//!   K    = HKDF-SHA256(salt="chatty-hybrid-v1", ikm=Z, info="chat-key-wrap" || EK_pub)
//!   CT   = AES-256-GCM(K, iv, payload)
//!
//! Wire format (base64 on the wire):
//!   [ len: u16 BE | EK_pub (len bytes, SEC1) | iv (12 bytes) | ciphertext + tag ]
//!
//! The relay may see every field; without the recipient private key none of
//! them reveal the payload.

use base64::{engine::general_purpose::STANDARD, Engine};
use p256::ecdh::{self, EphemeralSecret};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::{
    aead::{self, IV_LEN, TAG_LEN},
    error::CryptoError,
    identity::{IdentityKeyPair, PublicKeyBytes},
    kdf,
};

const LEN_PREFIX: usize = 2;

/// One wrapped payload, addressed to a single public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridCiphertext {
    pub ephemeral_public: PublicKeyBytes,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl HybridCiphertext {
    pub fn to_bytes(&self) -> Vec<u8> {
        let ek = &self.ephemeral_public.0;
        let mut out = Vec::with_capacity(LEN_PREFIX + ek.len() + IV_LEN + self.ciphertext.len());
        // A validated SEC1 point is at most 65 bytes.
        out.extend_from_slice(&(ek.len() as u16).to_be_bytes());
        out.extend_from_slice(ek);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse the length-prefixed layout. Fails with `MalformedEnvelope` when
    /// the prefix points past the end of the buffer or the remaining bytes
    /// cannot hold an IV and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < LEN_PREFIX {
            return Err(CryptoError::MalformedEnvelope("missing ephemeral key length prefix".into()));
        }
        let ek_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let body = &bytes[LEN_PREFIX..];
        if ek_len == 0 || body.len() < ek_len + IV_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "ephemeral key length {ek_len} does not fit a {}-byte body",
                body.len()
            )));
        }
        let (ek_bytes, rest) = body.split_at(ek_len);
        let ephemeral_public = PublicKeyBytes::from_sec1(ek_bytes)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        let (iv, ciphertext) = aead::split_iv(rest)?;

        Ok(Self {
            ephemeral_public,
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypt `payload` for `recipient`. Any length, including empty, is accepted.
pub fn wrap(payload: &[u8], recipient: &PublicKeyBytes) -> Result<HybridCiphertext, CryptoError> {
    let recipient_key = recipient.to_public_key()?;

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = PublicKeyBytes::from_public_key(&ephemeral.public_key());
    let shared = ephemeral.diffie_hellman(&recipient_key);

    let key = kdf::wrap_key_from_shared_secret(shared.raw_secret_bytes(), &ephemeral_public.0)?;
    let iv = aead::generate_iv();
    let ciphertext = aead::seal(&key, &iv, payload)?;

    Ok(HybridCiphertext {
        ephemeral_public,
        iv,
        ciphertext,
    })
}

/// Recover the payload with the recipient's private key.
///
/// A ciphertext addressed to another key, or modified in transit, fails
/// with [`CryptoError::AuthenticationFailure`].
pub fn unwrap(wrapped: &HybridCiphertext, recipient: &IdentityKeyPair) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ephemeral_key = wrapped.ephemeral_public.to_public_key()?;
    let shared = ecdh::diffie_hellman(
        recipient.secret_key().to_nonzero_scalar(),
        ephemeral_key.as_affine(),
    );

    let key = kdf::wrap_key_from_shared_secret(shared.raw_secret_bytes(), &wrapped.ephemeral_public.0)?;
    aead::open(&key, &wrapped.iv, &wrapped.ciphertext)
}
