//! chatty_crypto — Chatty end-to-end encryption primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited RustCrypto crates.
//! - Zeroize all secret material on drop.
//! - The relay only ever sees public keys and ciphertext produced here.
//!
//! # Module layout
//! - `identity` — long-term P-256 identity keypair + public key encoding
//! - `vault`    — password envelope (PBKDF2 + AES-GCM) around the identity key
//! - `hybrid`   — ECIES-style wrap of arbitrary bytes for one public key
//! - `message`  — chat key + message text encryption
//! - `aead`     — AES-256-GCM helpers
//! - `kdf`      — PBKDF2 / HKDF key derivation
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod hybrid;
pub mod identity;
pub mod kdf;
pub mod message;
pub mod vault;

pub use error::CryptoError;
pub use hybrid::HybridCiphertext;
pub use identity::{IdentityKeyPair, PublicKeyBytes};
pub use message::ChatKey;
pub use vault::PrivateKeyEnvelope;
