use thiserror::Error;

/// Boundary validation failure for relay payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event `{event}` is missing required field `{field}`")]
    MissingField { event: &'static str, field: &'static str },

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
}
