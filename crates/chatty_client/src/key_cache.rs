//! Session-scoped chat key cache.
//!
//! Populated by unwrapping each chat's key-for-me entry with the identity
//! private key. A refresh builds a complete new map and replaces the old one,
//! so readers never see a half-rebuilt cache.

use std::collections::HashMap;

use tracing::{debug, warn};

use chatty_crypto::{hybrid, ChatKey, IdentityKeyPair};
use chatty_proto::{ChatId, ChatRecord};

use crate::error::ClientError;

#[derive(Default, Clone)]
pub struct ChatKeyCache {
    keys: HashMap<ChatId, ChatKey>,
}

impl ChatKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwrap every chat's key. Chats whose key fails to open are logged and
    /// left out; the rest of the cache is unaffected.
    pub fn from_chats(chats: &[ChatRecord], identity: &IdentityKeyPair) -> Self {
        let mut keys = HashMap::with_capacity(chats.len());
        for chat in chats {
            match unwrap_chat_key(chat, identity) {
                Ok(key) => {
                    keys.insert(chat.id, key);
                }
                Err(e) => warn!("[chats] could not open key for chat {}: {e}", chat.id),
            }
        }
        debug!("[chats] key cache built: {}/{} chats", keys.len(), chats.len());
        Self { keys }
    }

    pub fn refresh(&mut self, chats: &[ChatRecord], identity: &IdentityKeyPair) {
        *self = Self::from_chats(chats, identity);
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&ChatKey> {
        self.keys.get(&chat_id)
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.keys.contains_key(&chat_id)
    }

    pub fn insert(&mut self, chat_id: ChatId, key: ChatKey) {
        self.keys.insert(chat_id, key);
    }

    /// Returns whether a key was present.
    pub fn evict(&mut self, chat_id: ChatId) -> bool {
        self.keys.remove(&chat_id).is_some()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for ChatKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.keys.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("ChatKeyCache").field("chats", &ids).finish()
    }
}

fn unwrap_chat_key(chat: &ChatRecord, identity: &IdentityKeyPair) -> Result<ChatKey, ClientError> {
    let wrapped = chat.key_for_me()?;
    let raw = hybrid::unwrap(&wrapped, identity)?;
    Ok(ChatKey::from_bytes(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_for(id: ChatId, key: &ChatKey, identity: &IdentityKeyPair) -> ChatRecord {
        let wrapped = hybrid::wrap(key.as_bytes(), &identity.public).unwrap();
        ChatRecord {
            id,
            name: format!("chat-{id}"),
            owner_id: 1,
            encrypted_key: Some(wrapped.to_b64()),
        }
    }

    #[test]
    fn refresh_holds_key_for_own_chat() {
        let alice = IdentityKeyPair::generate();
        let k = ChatKey::generate();
        let cache = ChatKeyCache::from_chats(&[chat_for(7, &k, &alice)], &alice);
        assert_eq!(cache.get(7), Some(&k));
        assert!(cache.get(8).is_none());
    }

    #[test]
    fn corrupted_entry_is_omitted() {
        let alice = IdentityKeyPair::generate();
        let good = ChatKey::generate();
        let mut broken = chat_for(2, &ChatKey::generate(), &alice);
        // Flip one byte of the wrapped key.
        let mut wire = chatty_crypto::HybridCiphertext::from_b64(broken.encrypted_key.as_deref().unwrap())
            .unwrap()
            .to_bytes();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        broken.encrypted_key = Some(chatty_crypto::HybridCiphertext::from_bytes(&wire).unwrap().to_b64());
        let missing = ChatRecord { id: 3, name: "no key".into(), owner_id: 1, encrypted_key: None };

        let cache = ChatKeyCache::from_chats(&[chat_for(1, &good, &alice), broken, missing], &alice);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1), Some(&good));
    }

    #[test]
    fn key_wrapped_for_someone_else_is_omitted() {
        let alice = IdentityKeyPair::generate();
        let mallory = IdentityKeyPair::generate();
        let cache = ChatKeyCache::from_chats(&[chat_for(1, &ChatKey::generate(), &mallory)], &alice);
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_replaces_whole_content() {
        let alice = IdentityKeyPair::generate();
        let mut cache = ChatKeyCache::new();
        cache.insert(99, ChatKey::generate());
        cache.refresh(&[chat_for(1, &ChatKey::generate(), &alice)], &alice);
        assert!(!cache.contains(99));
        assert!(cache.contains(1));
        assert!(cache.evict(1));
        assert!(!cache.evict(1));
    }
}
