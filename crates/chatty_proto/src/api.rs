//! API request/response types shared between the client and the relay.
//! These map directly to JSON bodies on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use chatty_crypto::{CryptoError, HybridCiphertext, PublicKeyBytes};

pub type UserId = i64;
pub type ChatId = i64;

/// Lowercase hex SHA-256 of the password. This is what the relay sees; the
/// raw password only ever feeds the local KDF.
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

// ── Accounts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `password_digest` of the user's password
    pub password: String,
    /// Base64 SEC1 P-256 public key
    pub public_key: String,
    /// Base64 `salt || iv || ciphertext`
    pub encrypted_private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// User as returned by `/login`, `/users/search` and `/chats/{id}/participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Empty when the user never published a key.
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub encrypted_private_key: String,
    #[serde(default)]
    pub is_verified: bool,
}

impl UserRecord {
    /// Published public key, or `None` if the user has not completed key setup.
    pub fn published_key(&self) -> Result<Option<PublicKeyBytes>, CryptoError> {
        if self.public_key.trim().is_empty() {
            return Ok(None);
        }
        PublicKeyBytes::from_b64(&self.public_key).map(Some)
    }
}

// ── Chats ────────────────────────────────────────────────────────────────────

/// One entry of `GET /chats`. `encrypted_key` is the viewer's own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub name: String,
    #[serde(default)]
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
}

impl ChatRecord {
    pub fn key_for_me(&self) -> Result<HybridCiphertext, CryptoError> {
        match self.encrypted_key.as_deref() {
            Some(b64) if !b64.trim().is_empty() => HybridCiphertext::from_b64(b64),
            _ => Err(CryptoError::MalformedEnvelope(format!("chat {} carries no key for this user", self.id))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    /// Creator's own wrapped copy of the new chat key (base64 hybrid ciphertext).
    pub encrypted_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChatResponse {
    pub id: ChatId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteRequest {
    pub username: String,
    /// Chat key wrapped for the invitee's public key (base64 hybrid ciphertext).
    pub encrypted_key: String,
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// Stored message as the relay returns it. `content` is base64 `iv || ciphertext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: i64,
    pub chat_id: ChatId,
    #[serde(default)]
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Frame the client pushes to send a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        assert_eq!(
            password_digest("hunter2"),
            "f52fbd32b2b3b86ff88ef6c490628285f482af15ddcb29541f94bcf526a3f6c7"
        );
    }

    #[test]
    fn chat_without_key_field_parses() {
        let chat: ChatRecord = serde_json::from_str(r#"{"id":4,"name":"ops","owner_id":1}"#).unwrap();
        assert!(chat.encrypted_key.is_none());
        assert!(chat.key_for_me().is_err());
    }

    #[test]
    fn user_without_key_has_no_published_key() {
        let user: UserRecord = serde_json::from_str(r#"{"id":2,"username":"bob","public_key":""}"#).unwrap();
        assert!(user.published_key().unwrap().is_none());
    }

    #[test]
    fn signup_omits_missing_email() {
        let req = SignupRequest {
            username: "a".into(),
            email: None,
            password: password_digest("pw"),
            public_key: "pk".into(),
            encrypted_private_key: "epk".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["public_key"], "pk");
    }
}
