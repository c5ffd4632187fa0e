//! Chat list loading and key distribution.
//!
//! Creating a chat mints its key exactly once; inviting re-wraps that same
//! key for the invitee. The relay only ever receives wrapped copies.

use tracing::{debug, info, warn};

use chatty_crypto::{hybrid, ChatKey, HybridCiphertext};
use chatty_proto::{
    api::{CreateChatRequest, InviteRequest},
    ChatId, ChatRecord, UserId, UserRecord,
};

use crate::client::{ChatClient, Unlocked};
use crate::error::ClientError;
use crate::key_cache::ChatKeyCache;
use crate::relay::Relay;

const LOAD_ATTEMPTS: usize = 3;

/// Most results the relay returns for one user search.
pub const SEARCH_LIMIT: usize = 10;

impl<R: Relay> ChatClient<R> {
    /// Fetch the chat list and rebuild the key cache from it.
    ///
    /// Unwrapping happens outside the session lock; the new list and cache
    /// are swapped in together. A fetch that raced a local change to the chat
    /// list is thrown away and repeated.
    pub async fn load_chats(&self) -> Result<Vec<ChatRecord>, ClientError> {
        for attempt in 1..=LOAD_ATTEMPTS {
            let Unlocked { identity, mark, .. } = self.identity().await?;
            let chats = self.relay.list_chats().await?;
            let keys = ChatKeyCache::from_chats(&chats, &identity);

            let mut session = self.session.lock().await;
            // The user may have logged out (or switched) while we were fetching.
            if !session.same_session(mark) {
                return Err(ClientError::NotLoggedIn);
            }
            if !session.unchanged_since(mark) {
                debug!("[chats] chat list changed during load (attempt {attempt}), fetching again");
                continue;
            }
            info!("[chats] loaded {} chats, {} keys", chats.len(), keys.len());
            if let Some(closed) = session.replace_chats(chats.clone(), keys) {
                debug!("[chats] open chat {closed} no longer listed");
            }
            return Ok(chats);
        }

        let session = self.session.lock().await;
        session.user()?;
        warn!("[chats] chat list kept changing during load, keeping the local list");
        Ok(session.chats().to_vec())
    }

    /// Create a chat with a fresh key wrapped for ourselves.
    pub async fn create_chat(&self, name: &str) -> Result<ChatRecord, ClientError> {
        let Unlocked { user_id, identity, mark } = self.identity().await?;
        let key = ChatKey::generate();
        let wrapped = hybrid::wrap(key.as_bytes(), &identity.public)?.to_b64();

        let id = self
            .relay
            .create_chat(&CreateChatRequest {
                name: name.to_string(),
                encrypted_key: wrapped.clone(),
            })
            .await?;

        let chat = ChatRecord {
            id,
            name: name.to_string(),
            owner_id: user_id,
            encrypted_key: Some(wrapped),
        };
        let mut session = self.session.lock().await;
        if !session.same_session(mark) {
            warn!("[chats] session ended while creating chat {id}, key not cached");
            return Err(ClientError::NotLoggedIn);
        }
        session.add_chat(chat.clone(), key);
        info!("[chats] created chat {id}");
        Ok(chat)
    }

    /// Wrap the cached key of `chat_id` for `invitee` without contacting the relay.
    pub async fn wrap_for_invitee(&self, chat_id: ChatId, invitee: &UserRecord) -> Result<HybridCiphertext, ClientError> {
        let key = self
            .session
            .lock()
            .await
            .keys()
            .get(chat_id)
            .cloned()
            .ok_or(ClientError::KeyUnavailable(chat_id))?;
        let public = invitee
            .published_key()?
            .ok_or_else(|| ClientError::RecipientHasNoKey(invitee.username.clone()))?;
        Ok(hybrid::wrap(key.as_bytes(), &public)?)
    }

    /// Give `invitee` access to `chat_id` by handing the relay their copy of
    /// the existing chat key.
    pub async fn invite(&self, chat_id: ChatId, invitee: &UserRecord) -> Result<HybridCiphertext, ClientError> {
        let wrapped = self.wrap_for_invitee(chat_id, invitee).await?;
        self.relay
            .invite(
                chat_id,
                &InviteRequest {
                    username: invitee.username.clone(),
                    encrypted_key: wrapped.to_b64(),
                },
            )
            .await?;
        info!("[chats] invited {} to chat {chat_id}", invitee.username);
        Ok(wrapped)
    }

    /// Look up `username` exactly and invite them.
    ///
    /// The relay has no exact-name lookup, only a substring search capped at
    /// [`SEARCH_LIMIT`] unordered results. When that many names contain
    /// `username`, the exact account can be cut off and this fails with
    /// `UserNotFound` even though the account exists.
    pub async fn invite_user(&self, chat_id: ChatId, username: &str) -> Result<HybridCiphertext, ClientError> {
        if !self.has_key(chat_id).await {
            return Err(ClientError::KeyUnavailable(chat_id));
        }
        let found = self.relay.search_users(username).await?;
        let truncated = found.len() >= SEARCH_LIMIT;
        let invitee = match found.into_iter().find(|u| u.username == username) {
            Some(user) => user,
            None => {
                if truncated {
                    warn!("[chats] search for {username} hit the relay's {SEARCH_LIMIT}-result cap without an exact match");
                }
                return Err(ClientError::UserNotFound(username.to_string()));
            }
        };
        self.invite(chat_id, &invitee).await
    }

    pub async fn participants(&self, chat_id: ChatId) -> Result<Vec<UserRecord>, ClientError> {
        self.relay.participants(chat_id).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserRecord>, ClientError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.relay.search_users(query.trim()).await
    }

    /// Owner-only removal of another member. Their already-decrypted key is
    /// not revoked.
    pub async fn remove_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ClientError> {
        self.relay.remove_participant(chat_id, user_id).await?;
        info!("[chats] removed user {user_id} from chat {chat_id}");
        Ok(())
    }

    pub async fn delete_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        self.relay.delete_chat(chat_id).await?;
        self.forget_chat(chat_id).await;
        info!("[chats] deleted chat {chat_id}");
        Ok(())
    }

    pub async fn leave_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        self.relay.leave_chat(chat_id).await?;
        self.forget_chat(chat_id).await;
        info!("[chats] left chat {chat_id}");
        Ok(())
    }

    /// Evict the key and list entry for `chat_id`. Returns whether it was open.
    pub async fn forget_chat(&self, chat_id: ChatId) -> bool {
        let was_open = self.session.lock().await.forget_chat(chat_id);
        if was_open {
            warn!("[chats] open chat {chat_id} is gone");
        }
        was_open
    }
}
