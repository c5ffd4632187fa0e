//! Session: in-memory key material unlocked at login.
//!
//! Holds the decrypted identity keypair, the chat key cache, the loaded chat
//! list and which chat is open. Nothing here is ever persisted; logging out
//! drops the identity and every chat key (both zeroize on drop).
//!
//! The whole state sits behind one async mutex owned by `ChatClient`.

use chatty_crypto::{ChatKey, IdentityKeyPair};
use chatty_proto::{ChatId, ChatRecord, UserId};

use crate::error::ClientError;
use crate::key_cache::ChatKeyCache;

/// The logged-in user with their unlocked identity.
#[derive(Debug)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    pub identity: IdentityKeyPair,
}

/// Public view of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub fingerprint: String,
}

impl From<&SessionUser> for UserProfile {
    fn from(user: &SessionUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            fingerprint: user.identity.public.fingerprint(),
        }
    }
}

/// Token handed out each time a chat is opened. A message fetch only applies
/// if its token is still the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchToken(u64);

/// Where the session stood when a relay call started. Checked again once the
/// call returns, before its result is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMark {
    epoch: u64,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenChat {
    chat_id: ChatId,
    token: FetchToken,
}

#[derive(Debug, Default)]
pub struct SessionState {
    user: Option<SessionUser>,
    keys: ChatKeyCache,
    chats: Vec<ChatRecord>,
    open_chat: Option<OpenChat>,
    // Monotonic across sessions so a ticket from before a re-login never matches.
    next_token: u64,
    // Bumped on every login and logout.
    epoch: u64,
    // Bumped on every change to the chat list or key cache.
    generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a session. Anything left from a previous login is discarded.
    pub fn start(&mut self, user: SessionUser) {
        self.end();
        self.user = Some(user);
    }

    pub fn end(&mut self) {
        self.epoch += 1;
        self.generation += 1;
        self.user = None;
        self.keys.clear();
        self.chats.clear();
        self.open_chat = None;
    }

    pub fn is_active(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Result<&SessionUser, ClientError> {
        self.user.as_ref().ok_or(ClientError::NotLoggedIn)
    }

    pub fn keys(&self) -> &ChatKeyCache {
        &self.keys
    }

    pub fn mark(&self) -> SessionMark {
        SessionMark {
            epoch: self.epoch,
            generation: self.generation,
        }
    }

    /// Same login as when `mark` was taken.
    pub fn same_session(&self, mark: SessionMark) -> bool {
        self.is_active() && self.epoch == mark.epoch
    }

    /// Same login, and no chat or key has changed since `mark` was taken.
    pub fn unchanged_since(&self, mark: SessionMark) -> bool {
        self.same_session(mark) && self.generation == mark.generation
    }

    pub fn chats(&self) -> &[ChatRecord] {
        &self.chats
    }

    pub fn chat(&self, chat_id: ChatId) -> Option<&ChatRecord> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    /// Swap in a freshly loaded chat list together with its key cache.
    /// The open chat is closed if it is no longer listed.
    pub fn replace_chats(&mut self, chats: Vec<ChatRecord>, keys: ChatKeyCache) -> Option<ChatId> {
        self.generation += 1;
        self.chats = chats;
        self.keys = keys;
        match self.open_chat {
            Some(open) if self.chat(open.chat_id).is_none() => {
                self.open_chat = None;
                Some(open.chat_id)
            }
            _ => None,
        }
    }

    /// Record a chat created in this session together with its fresh key.
    pub fn add_chat(&mut self, chat: ChatRecord, key: ChatKey) {
        self.generation += 1;
        self.keys.insert(chat.id, key);
        self.chats.retain(|c| c.id != chat.id);
        self.chats.push(chat);
    }

    /// Mark `chat_id` as open and return the token for its message fetch.
    pub fn open(&mut self, chat_id: ChatId) -> FetchToken {
        self.next_token += 1;
        let token = FetchToken(self.next_token);
        self.open_chat = Some(OpenChat { chat_id, token });
        token
    }

    pub fn open_chat(&self) -> Option<ChatId> {
        self.open_chat.map(|o| o.chat_id)
    }

    pub fn is_open(&self, chat_id: ChatId) -> bool {
        self.open_chat() == Some(chat_id)
    }

    pub fn is_current(&self, chat_id: ChatId, token: FetchToken) -> bool {
        self.open_chat == Some(OpenChat { chat_id, token })
    }

    /// Returns whether `chat_id` was the open chat.
    pub fn close_if_open(&mut self, chat_id: ChatId) -> bool {
        if self.is_open(chat_id) {
            self.open_chat = None;
            true
        } else {
            false
        }
    }

    /// Drop everything known about a chat: its key, its list entry, and the
    /// open-chat marker. Returns whether it was open.
    pub fn forget_chat(&mut self, chat_id: ChatId) -> bool {
        self.generation += 1;
        self.keys.evict(chat_id);
        self.chats.retain(|c| c.id != chat_id);
        self.close_if_open(chat_id)
    }
}
