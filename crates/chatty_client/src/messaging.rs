//! Message encryption and decryption through the session key cache.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use chatty_crypto::{message, ChatKey};
use chatty_proto::{ChatId, MessageRecord, OutboundMessage};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::relay::Relay;
use crate::session::{FetchToken, SessionUser};

pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[unable to decrypt message]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Missing key, wrong key or tampered ciphertext.
    Undecryptable,
}

impl MessageBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(t) => Some(t.as_str()),
            MessageBody::Undecryptable => None,
        }
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Text(t) => f.write_str(t),
            MessageBody::Undecryptable => f.write_str(UNDECRYPTABLE_PLACEHOLDER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub id: i64,
    pub chat_id: ChatId,
    pub username: String,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
    /// Sent by the logged-in user.
    pub is_mine: bool,
}

/// Handle for one in-flight message fetch, issued by [`ChatClient::select_chat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub chat_id: ChatId,
    token: FetchToken,
}

/// Decrypt one stored message. Failures become `MessageBody::Undecryptable`.
pub fn decrypt_record(record: &MessageRecord, key: Option<&ChatKey>, me: &SessionUser) -> DecryptedMessage {
    let body = match key {
        Some(key) => match message::decrypt(&record.content, key) {
            Ok(text) => MessageBody::Text(text),
            Err(e) => {
                warn!("[chats] message {} in chat {} did not decrypt: {e}", record.id, record.chat_id);
                MessageBody::Undecryptable
            }
        },
        None => {
            debug!("[chats] no key for chat {}, message {} left encrypted", record.chat_id, record.id);
            MessageBody::Undecryptable
        }
    };
    DecryptedMessage {
        id: record.id,
        chat_id: record.chat_id,
        username: record.username.clone(),
        body,
        created_at: record.created_at,
        is_mine: record.username == me.username,
    }
}

impl<R: Relay> ChatClient<R> {
    /// Open `chat_id`. Any fetch started for a previously opened chat
    /// becomes stale.
    pub async fn select_chat(&self, chat_id: ChatId) -> Result<FetchTicket, ClientError> {
        let mut session = self.session.lock().await;
        session.user()?;
        if session.chat(chat_id).is_none() {
            return Err(ClientError::UnknownChat(chat_id));
        }
        let token = session.open(chat_id);
        debug!("[chats] opened chat {chat_id}");
        Ok(FetchTicket { chat_id, token })
    }

    /// Fetch and decrypt the messages of the chat named by `ticket`.
    ///
    /// Returns `Ok(None)` if a different chat was opened (or the same one
    /// reopened) while the fetch was in flight.
    pub async fn load_messages(&self, ticket: FetchTicket) -> Result<Option<Vec<DecryptedMessage>>, ClientError> {
        let records = self.relay.messages(ticket.chat_id).await?;

        let session = self.session.lock().await;
        if !session.is_current(ticket.chat_id, ticket.token) {
            debug!("[chats] discarding stale fetch for chat {}", ticket.chat_id);
            return Ok(None);
        }
        let me = session.user()?;
        let key = session.keys().get(ticket.chat_id);
        Ok(Some(records.iter().map(|r| decrypt_record(r, key, me)).collect()))
    }

    /// Select and load in one step.
    pub async fn open_and_load(&self, chat_id: ChatId) -> Result<Option<Vec<DecryptedMessage>>, ClientError> {
        let ticket = self.select_chat(chat_id).await?;
        self.load_messages(ticket).await
    }

    /// Messages of any listed chat, without changing which chat is open.
    pub async fn history(&self, chat_id: ChatId) -> Result<Vec<DecryptedMessage>, ClientError> {
        let records = self.relay.messages(chat_id).await?;
        let session = self.session.lock().await;
        let me = session.user()?;
        let key = session.keys().get(chat_id);
        Ok(records.iter().map(|r| decrypt_record(r, key, me)).collect())
    }

    /// Decrypt a message that arrived over the push channel.
    pub async fn decrypt_incoming(&self, record: &MessageRecord) -> Result<DecryptedMessage, ClientError> {
        let session = self.session.lock().await;
        let me = session.user()?;
        Ok(decrypt_record(record, session.keys().get(record.chat_id), me))
    }

    /// Encrypt `text` for `chat_id`, ready for the push channel.
    pub async fn compose(&self, chat_id: ChatId, text: &str) -> Result<OutboundMessage, ClientError> {
        let key = self
            .session
            .lock()
            .await
            .keys()
            .get(chat_id)
            .cloned()
            .ok_or(ClientError::KeyUnavailable(chat_id))?;
        let content = message::encrypt(text, &key)?;
        Ok(OutboundMessage { chat_id, content })
    }
}
