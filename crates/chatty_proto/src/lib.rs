//! chatty_proto — Wire schemas for the Chatty relay
//!
//! The relay is a dumb store-and-forward server: every payload it handles is
//! either public (usernames, chat names, public keys) or ciphertext produced
//! by `chatty_crypto`.
//!
//! # Modules
//! - `api`   — REST request/response bodies
//! - `event` — push channel frames, validated into `PushEvent`
//! - `error` — boundary validation errors

pub mod api;
pub mod error;
pub mod event;

pub use api::{ChatId, ChatRecord, MessageRecord, OutboundMessage, UserId, UserRecord};
pub use error::ProtoError;
pub use event::PushEvent;
