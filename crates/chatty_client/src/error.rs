use thiserror::Error;

use chatty_crypto::CryptoError;
use chatty_proto::{ChatId, ProtoError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Tag check failed: wrong key or tampered data.
    #[error("Authentication failed: wrong password or tampered data")]
    AuthenticationFailure,

    #[error("No decrypted key for chat {0} in this session")]
    KeyUnavailable(ChatId),

    #[error("Not logged in: identity key is locked")]
    NotLoggedIn,

    #[error("User {0} has not published a public key")]
    RecipientHasNoKey(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Chat {0} is not in the loaded chat list")]
    UnknownChat(ChatId),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Relay rejected {endpoint} with HTTP {status}: {message}")]
    Relay { endpoint: String, status: u16, message: String },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl ClientError {
    /// Network and relay-side failures, as opposed to local crypto errors.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Relay { .. })
    }
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailure => ClientError::AuthenticationFailure,
            e if e.is_malformed() => ClientError::MalformedEnvelope(e.to_string()),
            e => ClientError::Crypto(e),
        }
    }
}

impl From<ProtoError> for ClientError {
    fn from(err: ProtoError) -> Self {
        ClientError::MalformedEnvelope(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::MalformedEnvelope(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
