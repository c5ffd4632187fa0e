//! Realtime sync over the relay's push channel.
//!
//! One loop owns the connection: it turns push frames into cache and list
//! updates, forwards queued outbound messages, and reconnects after a fixed
//! delay whenever the connection drops. Reconnecting never touches the
//! unlocked identity or the chat key cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use chatty_proto::{ChatId, ChatRecord, OutboundMessage, PushEvent, UserRecord};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::messaging::DecryptedMessage;
use crate::relay::Relay;

// ── Transport seam ───────────────────────────────────────────────────────────

/// Something that can open a push connection.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ClientError>;
}

/// One open push connection carrying JSON text frames.
#[async_trait]
pub trait PushConnection: Send {
    /// Next text frame, or `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Result<Option<String>, ClientError>;
    async fn send_frame(&mut self, text: String) -> Result<(), ClientError>;
}

/// WebSocket push channel authenticated with the relay session cookie.
pub struct WsChannel {
    url: Url,
    cookie_origin: Url,
    jar: Arc<Jar>,
}

impl WsChannel {
    pub fn new(url: Url, cookie_origin: Url, jar: Arc<Jar>) -> Self {
        Self { url, cookie_origin, jar }
    }
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ClientError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(cookie) = self.jar.cookies(&self.cookie_origin) {
            request.headers_mut().insert(COOKIE, cookie);
        } else {
            debug!("[sync] connecting without a session cookie");
        }
        let (stream, _response) = connect_async(request).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, ClientError> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(_) => return Ok(None),
                // Pings are answered by tungstenite on the next read.
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn send_frame(&mut self, text: String) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }
}

// ── Sync loop ────────────────────────────────────────────────────────────────

/// What the front end should re-render.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    Connected,
    Disconnected,
    ChatsRefreshed(Vec<ChatRecord>),
    /// A chat was deleted; its key has been evicted.
    ChatRemoved(ChatId),
    /// The open chat went away and has been closed.
    OpenChatClosed(ChatId),
    ParticipantsChanged { chat_id: ChatId, participants: Vec<UserRecord> },
    Message(DecryptedMessage),
}

enum PumpExit {
    Disconnected,
    Shutdown,
}

pub struct RealtimeSync<R: Relay, C: PushChannel> {
    client: ChatClient<R>,
    channel: C,
    reconnect_delay: Duration,
}

impl<R: Relay, C: PushChannel> RealtimeSync<R, C> {
    pub fn new(client: ChatClient<R>, channel: C) -> Self {
        let reconnect_delay = client.config().reconnect_delay;
        Self { client, channel, reconnect_delay }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Apply one push event to the session and report what changed.
    pub async fn handle_event(&self, event: PushEvent) -> Vec<SyncUpdate> {
        match event {
            PushEvent::NewChat { chat_id } => {
                debug!("[sync] new chat notification ({chat_id:?})");
                match self.client.load_chats().await {
                    Ok(chats) => vec![SyncUpdate::ChatsRefreshed(chats)],
                    Err(e) => {
                        warn!("[sync] chat refresh failed: {e}");
                        Vec::new()
                    }
                }
            }
            PushEvent::ChatDeleted { chat_id } => {
                let was_open = self.client.forget_chat(chat_id).await;
                info!("[sync] chat {chat_id} deleted");
                let mut updates = vec![SyncUpdate::ChatRemoved(chat_id)];
                if was_open {
                    updates.push(SyncUpdate::OpenChatClosed(chat_id));
                }
                updates
            }
            PushEvent::ParticipantLeft { chat_id, user_id } => {
                if self.client.open_chat().await != Some(chat_id) {
                    return Vec::new();
                }
                debug!("[sync] user {user_id:?} left open chat {chat_id}");
                match self.client.participants(chat_id).await {
                    Ok(participants) => vec![SyncUpdate::ParticipantsChanged { chat_id, participants }],
                    Err(e) => {
                        warn!("[sync] participant refresh for chat {chat_id} failed: {e}");
                        Vec::new()
                    }
                }
            }
            PushEvent::Message(record) => {
                if self.client.open_chat().await != Some(record.chat_id) {
                    return Vec::new();
                }
                match self.client.decrypt_incoming(&record).await {
                    Ok(msg) => vec![SyncUpdate::Message(msg)],
                    Err(e) => {
                        warn!("[sync] dropped message for chat {}: {e}", record.chat_id);
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Parse a raw frame and apply it. Malformed frames are logged and dropped.
    pub async fn handle_frame(&self, text: &str) -> Vec<SyncUpdate> {
        match PushEvent::parse(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!("[sync] ignoring malformed push frame: {e}");
                Vec::new()
            }
        }
    }

    /// Run until the `updates` receiver is dropped.
    ///
    /// Messages taken from `outbound` while disconnected are kept and sent
    /// once a connection is back.
    pub async fn run(self, mut outbound: mpsc::Receiver<OutboundMessage>, updates: mpsc::Sender<SyncUpdate>) {
        let mut pending: Option<OutboundMessage> = None;
        let mut outbound_open = true;

        loop {
            match self.channel.connect().await {
                Ok(mut conn) => {
                    info!("[sync] push channel connected");
                    if updates.send(SyncUpdate::Connected).await.is_err() {
                        return;
                    }
                    let exit = self
                        .pump(conn.as_mut(), &mut outbound, &mut outbound_open, &updates, &mut pending)
                        .await;
                    match exit {
                        PumpExit::Shutdown => return,
                        PumpExit::Disconnected => {
                            warn!("[sync] push channel lost, reconnecting in {:?}", self.reconnect_delay);
                            if updates.send(SyncUpdate::Disconnected).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => warn!("[sync] connect failed: {e}; retrying in {:?}", self.reconnect_delay),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = updates.closed() => return,
            }
        }
    }

    async fn pump(
        &self,
        conn: &mut dyn PushConnection,
        outbound: &mut mpsc::Receiver<OutboundMessage>,
        outbound_open: &mut bool,
        updates: &mpsc::Sender<SyncUpdate>,
        pending: &mut Option<OutboundMessage>,
    ) -> PumpExit {
        if let Some(msg) = pending.take() {
            if let Err(e) = send_outbound(conn, &msg).await {
                warn!("[sync] resend to chat {} failed: {e}", msg.chat_id);
                *pending = Some(msg);
                return PumpExit::Disconnected;
            }
        }

        loop {
            tokio::select! {
                frame = conn.next_frame() => match frame {
                    Ok(Some(text)) => {
                        for update in self.handle_frame(&text).await {
                            if updates.send(update).await.is_err() {
                                return PumpExit::Shutdown;
                            }
                        }
                    }
                    Ok(None) => return PumpExit::Disconnected,
                    Err(e) => {
                        warn!("[sync] push channel error: {e}");
                        return PumpExit::Disconnected;
                    }
                },
                msg = outbound.recv(), if *outbound_open => match msg {
                    Some(msg) => {
                        if let Err(e) = send_outbound(conn, &msg).await {
                            warn!("[sync] send to chat {} failed: {e}", msg.chat_id);
                            *pending = Some(msg);
                            return PumpExit::Disconnected;
                        }
                    }
                    None => *outbound_open = false,
                },
                _ = updates.closed() => return PumpExit::Shutdown,
            }
        }
    }
}

async fn send_outbound(conn: &mut dyn PushConnection, msg: &OutboundMessage) -> Result<(), ClientError> {
    let text = serde_json::to_string(msg).map_err(|e| ClientError::MalformedEnvelope(e.to_string()))?;
    conn.send_frame(text).await?;
    debug!("[sync] sent message to chat {}", msg.chat_id);
    Ok(())
}
