//! chatty_client — Session keys and relay access for Chatty
//!
//! # Key handling
//! - The identity private key is decrypted at login and held only in the
//!   in-memory session; logout drops it along with every chat key.
//! - Chat keys are unwrapped from each chat's key-for-me entry when the chat
//!   list loads, and looked up from the `ChatKeyCache` for every message.
//! - Inviting re-wraps an existing chat key for the invitee; a chat key is
//!   minted only when the chat is created.
//!
//! # Concurrency
//! `ChatClient` is cheap to clone. All clones share one session behind an
//! async mutex; `RealtimeSync` runs as its own task against a clone.

pub mod auth;
pub mod chats;
pub mod client;
pub mod config;
pub mod error;
pub mod key_cache;
pub mod messaging;
pub mod realtime;
pub mod relay;
pub mod session;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use key_cache::ChatKeyCache;
pub use messaging::{DecryptedMessage, FetchTicket, MessageBody};
pub use realtime::{PushChannel, PushConnection, RealtimeSync, SyncUpdate, WsChannel};
pub use relay::{HttpRelay, Relay};
pub use session::UserProfile;
