//! `ChatClient`: the one controller that owns the session.
//!
//! Cloning the client shares the relay and the session, so a UI task and the
//! realtime loop operate on the same state.

use std::sync::Arc;

use tokio::sync::Mutex;

use chatty_crypto::{ChatKey, IdentityKeyPair};
use chatty_proto::{ChatId, ChatRecord, UserId};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::relay::Relay;
use crate::session::{SessionMark, SessionState, UserProfile};

pub(crate) struct Unlocked {
    pub user_id: UserId,
    pub identity: IdentityKeyPair,
    pub mark: SessionMark,
}

pub struct ChatClient<R: Relay> {
    pub(crate) relay: Arc<R>,
    pub(crate) config: ClientConfig,
    pub(crate) session: Arc<Mutex<SessionState>>,
}

impl<R: Relay> Clone for ChatClient<R> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
            config: self.config.clone(),
            session: self.session.clone(),
        }
    }
}

impl<R: Relay> ChatClient<R> {
    pub fn new(relay: R, config: ClientConfig) -> Self {
        Self::with_shared_relay(Arc::new(relay), config)
    }

    pub fn with_shared_relay(relay: Arc<R>, config: ClientConfig) -> Self {
        Self {
            relay,
            config,
            session: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.lock().await.is_active()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.session.lock().await.user().ok().map(UserProfile::from)
    }

    /// Chat list as of the last load.
    pub async fn chats(&self) -> Vec<ChatRecord> {
        self.session.lock().await.chats().to_vec()
    }

    pub async fn open_chat(&self) -> Option<ChatId> {
        self.session.lock().await.open_chat()
    }

    pub async fn has_key(&self, chat_id: ChatId) -> bool {
        self.session.lock().await.keys().contains(chat_id)
    }

    /// Copy of the decrypted chat key, if this session holds one.
    pub async fn chat_key(&self, chat_id: ChatId) -> Option<ChatKey> {
        self.session.lock().await.keys().get(chat_id).cloned()
    }

    /// Clone of the unlocked identity, taken so crypto can run without the
    /// lock. The mark lets the caller check the session again afterwards.
    pub(crate) async fn identity(&self) -> Result<Unlocked, ClientError> {
        let session = self.session.lock().await;
        let user = session.user()?;
        Ok(Unlocked {
            user_id: user.id,
            identity: user.identity.clone(),
            mark: session.mark(),
        })
    }
}
