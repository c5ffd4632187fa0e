//! In-memory relay and push channel shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Notify};

use chatty_client::chats::SEARCH_LIMIT;
use chatty_client::{ChatClient, ClientConfig, ClientError, PushChannel, PushConnection, Relay, SyncUpdate};
use chatty_crypto::HybridCiphertext;
use chatty_proto::api::{password_digest, CreateChatRequest, InviteRequest, LoginRequest, SignupRequest};
use chatty_proto::{ChatId, ChatRecord, MessageRecord, UserId, UserRecord};

// ── Relay ────────────────────────────────────────────────────────────────────

struct StoredUser {
    id: UserId,
    username: String,
    password: String,
    public_key: String,
    encrypted_private_key: String,
}

struct StoredChat {
    id: ChatId,
    name: String,
    owner_id: UserId,
    /// Participant -> their wrapped copy of the chat key.
    keys: HashMap<UserId, String>,
}

#[derive(Default)]
struct Backend {
    next_id: i64,
    users: Vec<StoredUser>,
    chats: Vec<StoredChat>,
    messages: Vec<MessageRecord>,
}

impl Backend {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: UserId) -> Option<&StoredUser> {
        self.users.iter().find(|u| u.id == id)
    }

    fn user_by_name(&self, username: &str) -> Option<&StoredUser> {
        self.users.iter().find(|u| u.username == username)
    }

    fn chat_mut(&mut self, id: ChatId) -> Result<&mut StoredChat, ClientError> {
        self.chats
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| rejected("chat", 404, "Chat not found"))
    }

    fn record(&self, user: &StoredUser) -> UserRecord {
        UserRecord {
            id: user.id,
            username: user.username.clone(),
            email: None,
            public_key: user.public_key.clone(),
            encrypted_private_key: user.encrypted_private_key.clone(),
            is_verified: true,
        }
    }
}

fn rejected(endpoint: &str, status: u16, message: &str) -> ClientError {
    ClientError::Relay {
        endpoint: endpoint.to_string(),
        status,
        message: message.to_string(),
    }
}

/// Holds one relay call open until the test releases it.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the held call has done its work and is parked.
    pub async fn entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("held call never arrived");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// One client's view of a shared in-memory relay. `fork` gives another
/// client its own login on the same backend.
pub struct MemoryRelay {
    backend: Arc<Mutex<Backend>>,
    me: Mutex<Option<UserId>>,
    gates: Mutex<HashMap<&'static str, Gate>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(Mutex::new(Backend::default())),
            me: Mutex::new(None),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn fork(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            me: Mutex::new(None),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Park the next `call` on this relay after it has been applied, before
    /// it returns to the client.
    pub fn hold(&self, call: &'static str) -> Gate {
        let gate = Gate::default();
        self.gates.lock().unwrap().insert(call, gate.clone());
        gate
    }

    async fn pass(&self, call: &str) {
        let gate = self.gates.lock().unwrap().remove(call);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn me(&self, endpoint: &str) -> Result<UserId, ClientError> {
        self.me.lock().unwrap().ok_or_else(|| rejected(endpoint, 401, "Unauthorized"))
    }

    fn id_of(&self, username: &str) -> UserId {
        self.backend.lock().unwrap().user_by_name(username).map(|u| u.id).unwrap()
    }

    /// Store a message as if it had arrived over the push channel.
    pub fn post_message(&self, chat_id: ChatId, username: &str, content: &str) -> MessageRecord {
        let user_id = self.id_of(username);
        let mut backend = self.backend.lock().unwrap();
        let record = MessageRecord {
            id: backend.next_id(),
            chat_id,
            user_id,
            username: username.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        backend.messages.push(record.clone());
        record
    }

    pub fn stored_messages(&self, chat_id: ChatId) -> Vec<MessageRecord> {
        let backend = self.backend.lock().unwrap();
        backend.messages.iter().filter(|m| m.chat_id == chat_id).cloned().collect()
    }

    pub fn stored_key(&self, chat_id: ChatId, username: &str) -> Option<String> {
        let user_id = self.id_of(username);
        let backend = self.backend.lock().unwrap();
        backend
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .and_then(|c| c.keys.get(&user_id).cloned())
    }

    /// Flip one byte inside `username`'s wrapped copy of the chat key.
    pub fn corrupt_key(&self, chat_id: ChatId, username: &str) {
        let user_id = self.id_of(username);
        let mut backend = self.backend.lock().unwrap();
        let chat = backend.chat_mut(chat_id).unwrap();
        let entry = chat.keys.get_mut(&user_id).unwrap();
        let mut wire = HybridCiphertext::from_b64(entry).unwrap().to_bytes();
        let last = wire.len() - 1;
        wire[last] ^= 0x80;
        *entry = HybridCiphertext::from_bytes(&wire).unwrap().to_b64();
    }

    /// Make the relay accept `password` for `username` without touching the
    /// stored key envelope.
    pub fn force_password(&self, username: &str, password: &str) {
        let mut backend = self.backend.lock().unwrap();
        let user = backend.users.iter_mut().find(|u| u.username == username).unwrap();
        user.password = password_digest(password);
    }

    /// An account that never published a key.
    pub fn register_keyless(&self, username: &str) {
        let mut backend = self.backend.lock().unwrap();
        let id = backend.next_id();
        backend.users.push(StoredUser {
            id,
            username: username.to_string(),
            password: password_digest("unused"),
            public_key: String::new(),
            encrypted_private_key: String::new(),
        });
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError> {
        let mut backend = self.backend.lock().unwrap();
        if backend.user_by_name(&req.username).is_some() {
            return Err(rejected("/signup", 409, "Username or Email already exists"));
        }
        let id = backend.next_id();
        backend.users.push(StoredUser {
            id,
            username: req.username.clone(),
            password: req.password.clone(),
            public_key: req.public_key.clone(),
            encrypted_private_key: req.encrypted_private_key.clone(),
        });
        Ok(())
    }

    async fn login(&self, req: &LoginRequest) -> Result<UserRecord, ClientError> {
        let backend = self.backend.lock().unwrap();
        let user = backend
            .user_by_name(&req.username)
            .filter(|u| u.password == req.password)
            .ok_or_else(|| rejected("/login", 401, "Invalid credentials"))?;
        *self.me.lock().unwrap() = Some(user.id);
        Ok(backend.record(user))
    }

    async fn list_chats(&self) -> Result<Vec<ChatRecord>, ClientError> {
        let me = self.me("/chats")?;
        let chats: Vec<ChatRecord> = {
            let backend = self.backend.lock().unwrap();
            backend
                .chats
                .iter()
                .filter_map(|c| {
                    c.keys.get(&me).map(|k| ChatRecord {
                        id: c.id,
                        name: c.name.clone(),
                        owner_id: c.owner_id,
                        encrypted_key: Some(k.clone()),
                    })
                })
                .collect()
        };
        self.pass("list_chats").await;
        Ok(chats)
    }

    async fn create_chat(&self, req: &CreateChatRequest) -> Result<ChatId, ClientError> {
        let me = self.me("/chats")?;
        let id = {
            let mut backend = self.backend.lock().unwrap();
            let id = backend.next_id();
            backend.chats.push(StoredChat {
                id,
                name: req.name.clone(),
                owner_id: me,
                keys: HashMap::from([(me, req.encrypted_key.clone())]),
            });
            id
        };
        self.pass("create_chat").await;
        Ok(id)
    }

    async fn invite(&self, chat_id: ChatId, req: &InviteRequest) -> Result<(), ClientError> {
        let me = self.me("invite")?;
        let mut backend = self.backend.lock().unwrap();
        let invitee = backend
            .user_by_name(&req.username)
            .map(|u| u.id)
            .ok_or_else(|| rejected("invite", 404, "User not found"))?;
        let chat = backend.chat_mut(chat_id)?;
        if !chat.keys.contains_key(&me) {
            return Err(rejected("invite", 403, "Forbidden"));
        }
        chat.keys.insert(invitee, req.encrypted_key.clone());
        Ok(())
    }

    async fn messages(&self, chat_id: ChatId) -> Result<Vec<MessageRecord>, ClientError> {
        let me = self.me("messages")?;
        let mut backend = self.backend.lock().unwrap();
        if !backend.chat_mut(chat_id)?.keys.contains_key(&me) {
            return Err(rejected("messages", 403, "Forbidden"));
        }
        Ok(backend.messages.iter().filter(|m| m.chat_id == chat_id).cloned().collect())
    }

    async fn participants(&self, chat_id: ChatId) -> Result<Vec<UserRecord>, ClientError> {
        self.me("participants")?;
        let mut backend = self.backend.lock().unwrap();
        let mut ids: Vec<UserId> = backend.chat_mut(chat_id)?.keys.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .filter_map(|id| backend.user(id).map(|u| backend.record(u)))
            .collect())
    }

    async fn remove_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ClientError> {
        let me = self.me("participants")?;
        let mut backend = self.backend.lock().unwrap();
        let chat = backend.chat_mut(chat_id)?;
        if chat.owner_id != me {
            return Err(rejected("participants", 403, "Forbidden"));
        }
        chat.keys.remove(&user_id);
        Ok(())
    }

    async fn delete_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        let me = self.me("delete")?;
        let mut backend = self.backend.lock().unwrap();
        if backend.chat_mut(chat_id)?.owner_id != me {
            return Err(rejected("delete", 403, "Forbidden"));
        }
        backend.chats.retain(|c| c.id != chat_id);
        backend.messages.retain(|m| m.chat_id != chat_id);
        Ok(())
    }

    async fn leave_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        let me = self.me("leave")?;
        let mut backend = self.backend.lock().unwrap();
        backend.chat_mut(chat_id)?.keys.remove(&me);
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserRecord>, ClientError> {
        self.me("/users/search")?;
        let backend = self.backend.lock().unwrap();
        Ok(backend
            .users
            .iter()
            .filter(|u| u.username.contains(query))
            .take(SEARCH_LIMIT)
            .map(|u| backend.record(u))
            .collect())
    }
}

// ── Push channel ─────────────────────────────────────────────────────────────

struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PushConnection for MemoryConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, ClientError> {
        Ok(self.inbound.recv().await)
    }

    async fn send_frame(&mut self, text: String) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}

/// Hands out scripted connections in order; fails to connect when none are left.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    scripted: Arc<Mutex<VecDeque<MemoryConnection>>>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.scripted.lock().unwrap().push_back(MemoryConnection {
            inbound: rx,
            sent: sent.clone(),
        });
        ConnectionHandle { inbound: Some(tx), sent }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for MemoryChannel {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.scripted.lock().unwrap().pop_front() {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(ClientError::Transport("connection refused".into())),
        }
    }
}

/// Test-side end of a scripted connection.
pub struct ConnectionHandle {
    inbound: Option<mpsc::UnboundedSender<String>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ConnectionHandle {
    pub fn push(&self, frame: &str) {
        if let Some(tx) = &self.inbound {
            tx.send(frame.to_string()).unwrap();
        }
    }

    /// Server-side close.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub fn config() -> ClientConfig {
    let mut config = ClientConfig::new("http://relay.test");
    config.reconnect_delay = Duration::from_millis(20);
    config
}

/// Sign up `username` on the shared relay and return a logged-in client.
pub async fn user(server: &MemoryRelay, username: &str, password: &str) -> ChatClient<MemoryRelay> {
    let client = ChatClient::new(server.fork(), config());
    client.signup(username, None, password).await.unwrap();
    client.login(username, password).await.unwrap();
    client
}

/// A second, independent session for an existing account.
pub async fn relogin(server: &MemoryRelay, username: &str, password: &str) -> ChatClient<MemoryRelay> {
    let client = ChatClient::new(server.fork(), config());
    client.login(username, password).await.unwrap();
    client
}

pub async fn next_update(rx: &mut mpsc::Receiver<SyncUpdate>) -> SyncUpdate {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for sync update")
        .expect("sync loop ended")
}
