//! Push channel events: what the relay sends over the WebSocket.
//!
//! Frames are flat JSON objects:
//!   `{type?, chat_id?, user_id?, content?, username?, created_at?}`
//! A frame without `type` is a chat message. Everything is validated here so
//! nothing downstream deals with half-filled frames.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::{ChatId, MessageRecord, UserId};
use crate::error::ProtoError;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    chat_id: Option<ChatId>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// A validated push event.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// The user was added to a chat (the relay does not always say which).
    NewChat { chat_id: Option<ChatId> },
    ChatDeleted { chat_id: ChatId },
    ParticipantLeft { chat_id: ChatId, user_id: Option<UserId> },
    Message(MessageRecord),
}

impl PushEvent {
    pub fn parse(text: &str) -> Result<Self, ProtoError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        match frame.kind.as_deref() {
            Some("new_chat") => Ok(PushEvent::NewChat { chat_id: frame.chat_id }),
            Some("chat_deleted") => Ok(PushEvent::ChatDeleted {
                chat_id: require(frame.chat_id, "chat_deleted", "chat_id")?,
            }),
            Some("participant_left") => Ok(PushEvent::ParticipantLeft {
                chat_id: require(frame.chat_id, "participant_left", "chat_id")?,
                user_id: frame.user_id,
            }),
            None | Some("message") => Ok(PushEvent::Message(MessageRecord {
                id: frame.id.unwrap_or_default(),
                chat_id: require(frame.chat_id, "message", "chat_id")?,
                user_id: frame.user_id.unwrap_or_default(),
                username: require(frame.username, "message", "username")?,
                content: require(frame.content, "message", "content")?,
                created_at: frame.created_at.unwrap_or_else(Utc::now),
            })),
            Some(other) => Err(ProtoError::UnknownEvent(other.to_string())),
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            PushEvent::NewChat { chat_id } => *chat_id,
            PushEvent::ChatDeleted { chat_id } | PushEvent::ParticipantLeft { chat_id, .. } => Some(*chat_id),
            PushEvent::Message(msg) => Some(msg.chat_id),
        }
    }
}

fn require<T>(value: Option<T>, event: &'static str, field: &'static str) -> Result<T, ProtoError> {
    value.ok_or(ProtoError::MissingField { event, field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_frame_is_message() {
        let ev = PushEvent::parse(
            r#"{"chat_id":3,"user_id":1,"username":"alice","content":"AAAA","created_at":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        match ev {
            PushEvent::Message(m) => {
                assert_eq!(m.chat_id, 3);
                assert_eq!(m.username, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_new_chat_notification() {
        let ev = PushEvent::parse(r#"{"type":"new_chat"}"#).unwrap();
        assert!(matches!(ev, PushEvent::NewChat { chat_id: None }));
    }

    #[test]
    fn lifecycle_events_need_chat_id() {
        let ev = PushEvent::parse(r#"{"type":"participant_left","chat_id":9,"user_id":4}"#).unwrap();
        assert!(matches!(ev, PushEvent::ParticipantLeft { chat_id: 9, user_id: Some(4) }));

        let err = PushEvent::parse(r#"{"type":"chat_deleted"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::MissingField { field: "chat_id", .. }));
    }

    #[test]
    fn message_without_content_rejected() {
        let err = PushEvent::parse(r#"{"chat_id":1,"username":"a"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::MissingField { field: "content", .. }));
    }

    #[test]
    fn unknown_type_and_garbage_rejected() {
        assert!(matches!(
            PushEvent::parse(r#"{"type":"typing","chat_id":1}"#).unwrap_err(),
            ProtoError::UnknownEvent(_)
        ));
        assert!(matches!(PushEvent::parse("not json").unwrap_err(), ProtoError::Json(_)));
    }
}
