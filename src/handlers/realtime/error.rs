use thiserror::Error;

/// Client-frame failures. Every one is reported as an `error` event and the
/// connection keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Frame is not JSON, has no string `type`, or its fields do not match the type
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(String),

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("{field} exceeds maximum size of {max} bytes")]
    TooLarge { field: &'static str, max: usize },

    #[error("Conversation item not found: {0}")]
    ItemNotFound(String),

    #[error("Content index {index} is not valid for item {item_id}")]
    InvalidContentIndex { item_id: String, index: usize },

    #[error("Response {0} is already in progress")]
    ResponseInProgress(String),

    #[error("No response is in progress")]
    NoActiveResponse,

    #[error("Connection is not active")]
    NotActive,
}

impl EventError {
    /// Code carried in the error event's `type` and `code` fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_)
            | Self::UnsupportedEvent(_)
            | Self::InvalidAudio(_)
            | Self::TooLarge { .. }
            | Self::InvalidContentIndex { .. }
            | Self::NotActive => "invalid_event",
            Self::ItemNotFound(_) => "item_not_found",
            Self::ResponseInProgress(_) => "response_already_active",
            Self::NoActiveResponse => "response_not_active",
        }
    }

    /// Offending request field, when one can be named.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAudio(_) => Some("audio"),
            Self::TooLarge { field, .. } => Some(field),
            Self::ItemNotFound(_) => Some("item_id"),
            Self::InvalidContentIndex { .. } => Some("content_index"),
            _ => None,
        }
    }
}

pub type EventResult<T> = Result<T, EventError>;
