//! Realtime WebSocket message types
//!
//! Client events are JSON objects whose `type` field selects the variant. They are
//! parsed once into [`ClientEvent`]; handlers never touch untyped maps. Server events
//! are serialized from [`ServerEvent`] with a fresh `event_id` stamped on each frame.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{EventError, EventResult};
use super::session::Session;

/// Maximum allowed size for instructions (100 KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

/// Maximum allowed size for a text content part (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

/// Maximum base64 payload of a single audio append (15 MB)
pub const MAX_AUDIO_APPEND_SIZE: usize = 15 * 1024 * 1024;

/// Every client event type this server understands.
pub const CLIENT_EVENT_TYPES: &[&str] = &[
    "session.update",
    "input_audio_buffer.append",
    "input_audio_buffer.commit",
    "input_audio_buffer.clear",
    "conversation.item.create",
    "conversation.item.truncate",
    "conversation.item.delete",
    "response.create",
    "response.cancel",
];

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

// =============================================================================
// Session configuration
// =============================================================================

/// `max_response_output_tokens`: a number or `"inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxTokens {
    Number(u32),
    Infinite(String),
}

impl MaxTokens {
    pub fn infinite() -> Self {
        Self::Infinite("inf".to_string())
    }

    pub fn limit(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Infinite(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub create_response: bool,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            detection_type: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 200,
            create_response: true,
        }
    }
}

/// Partial turn-detection settings from `session.update`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TurnDetectionUpdate {
    #[serde(rename = "type")]
    pub detection_type: Option<String>,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
    pub create_response: Option<bool>,
}

impl TurnDetectionUpdate {
    pub fn apply_to(self, target: &mut TurnDetection) {
        if let Some(detection_type) = self.detection_type {
            target.detection_type = detection_type;
        }
        if let Some(threshold) = self.threshold {
            target.threshold = threshold;
        }
        if let Some(prefix_padding_ms) = self.prefix_padding_ms {
            target.prefix_padding_ms = prefix_padding_ms;
        }
        if let Some(silence_duration_ms) = self.silence_duration_ms {
            target.silence_duration_ms = silence_duration_ms;
        }
        if let Some(create_response) = self.create_response {
            target.create_response = create_response;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default = "function_tool_type")]
    pub tool_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

fn function_tool_type() -> String {
    "function".to_string()
}

/// Fields a client may change with `session.update`. Absent fields are left alone;
/// `turn_detection: null` and `input_audio_transcription: null` switch the feature off.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionUpdate {
    pub modalities: Option<Vec<String>>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    pub input_audio_format: Option<String>,
    pub output_audio_format: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub input_audio_transcription: Option<Option<InputAudioTranscription>>,
    #[serde(default, deserialize_with = "present")]
    pub turn_detection: Option<Option<TurnDetectionUpdate>>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<MaxTokens>,
}

// =============================================================================
// Conversation items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

impl ItemStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One typed fragment of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    InputAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default)]
        transcript: Option<String>,
    },
    Text {
        text: String,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default)]
        transcript: Option<String>,
    },
}

impl ContentPart {
    /// Text carried by the part, or its transcript for audio parts.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::InputText { text } | Self::Text { text } => Some(text),
            Self::InputAudio { transcript, .. } | Self::Audio { transcript, .. } => {
                transcript.as_deref()
            }
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::InputAudio { .. } | Self::Audio { .. })
    }

    /// Back-fill the transcript of an audio part. Text parts are left unchanged.
    pub fn set_transcript(&mut self, value: Option<String>) {
        if let Self::InputAudio { transcript, .. } | Self::Audio { transcript, .. } = self {
            *transcript = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationItem {
    pub id: String,
    pub object: &'static str,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    pub const OBJECT: &'static str = "realtime.item";

    pub fn message(role: Role, status: ItemStatus, content: Vec<ContentPart>) -> Self {
        Self {
            id: new_id("item"),
            object: Self::OBJECT,
            item_type: ItemType::Message,
            status,
            role: Some(role),
            content,
            call_id: None,
            name: None,
            arguments: None,
            output: None,
        }
    }

    /// Move the status forward. A final status never goes back.
    pub fn advance_status(&mut self, next: ItemStatus) -> bool {
        if self.status.is_final() || next == ItemStatus::InProgress {
            return false;
        }
        self.status = next;
        true
    }

    /// All text and transcripts of the item, joined.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentPart::text).collect()
    }
}

/// Item payload of `conversation.item.create`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemCreate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default = "default_item_type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

fn default_item_type() -> ItemType {
    ItemType::Message
}

impl ItemCreate {
    /// Validate the client's item and turn it into a completed conversation item.
    pub fn into_item(self) -> EventResult<ConversationItem> {
        match self.item_type {
            ItemType::Message if self.role.is_none() => {
                return Err(EventError::InvalidEvent(
                    "item.role is required for message items".to_string(),
                ));
            }
            ItemType::FunctionCall if self.name.is_none() => {
                return Err(EventError::InvalidEvent(
                    "item.name is required for function_call items".to_string(),
                ));
            }
            ItemType::FunctionCallOutput if self.call_id.is_none() => {
                return Err(EventError::InvalidEvent(
                    "item.call_id is required for function_call_output items".to_string(),
                ));
            }
            _ => {}
        }

        for part in &self.content {
            if let Some(text) = part.text()
                && text.len() > MAX_TEXT_SIZE
            {
                return Err(EventError::TooLarge {
                    field: "item.content",
                    max: MAX_TEXT_SIZE,
                });
            }
        }

        Ok(ConversationItem {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| new_id("item")),
            object: ConversationItem::OBJECT,
            item_type: self.item_type,
            status: ItemStatus::Completed,
            role: self.role,
            content: self.content,
            call_id: self.call_id,
            name: self.name,
            arguments: self.arguments,
            output: self.output,
        })
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Per-response overrides from `response.create`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseParams {
    pub modalities: Option<Vec<String>>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    pub output_audio_format: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<MaxTokens>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDetails {
    #[serde(rename = "type")]
    pub kind: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseResource {
    pub id: String,
    pub object: &'static str,
    pub status: ResponseStatus,
    pub status_details: Option<StatusDetails>,
    pub output: Vec<ConversationItem>,
}

impl ResponseResource {
    pub fn in_progress(id: &str) -> Self {
        Self {
            id: id.to_string(),
            object: "realtime.response",
            status: ResponseStatus::InProgress,
            status_details: None,
            output: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationResource {
    pub id: String,
    pub object: &'static str,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: code.to_string(),
            code: code.to_string(),
            message: message.into(),
            param: None,
            event_id: None,
        }
    }

    /// Error detail for a rejected client event, correlated by its `event_id`.
    pub fn from_event_error(error: &EventError, event_id: Option<String>) -> Self {
        Self {
            param: error.param().map(str::to_string),
            event_id,
            ..Self::new(error.code(), error.to_string())
        }
    }
}

// =============================================================================
// Client events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit {},

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear {},

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(default)]
        previous_item_id: Option<String>,
        item: ItemCreate,
    },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: usize,
        audio_end_ms: u64,
    },

    #[serde(rename = "conversation.item.delete")]
    ConversationItemDelete { item_id: String },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(default)]
        response: Option<ResponseParams>,
    },

    #[serde(rename = "response.cancel")]
    ResponseCancel {
        #[serde(default)]
        response_id: Option<String>,
    },
}

/// A parsed client frame with its optional correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event_id: Option<String>,
    pub event: ClientEvent,
}

/// A client frame that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEvent {
    pub event_id: Option<String>,
    pub error: EventError,
}

/// Parse one client text frame.
///
/// A frame without a string `type` is an `InvalidEvent`; a well-formed frame whose type
/// is not in [`CLIENT_EVENT_TYPES`] is an `UnsupportedEvent`.
pub fn parse_client_event(text: &str) -> Result<InboundEvent, RejectedEvent> {
    let reject = |event_id: Option<String>, error: EventError| RejectedEvent { event_id, error };

    let value: Value = serde_json::from_str(text)
        .map_err(|e| reject(None, EventError::InvalidEvent(format!("malformed JSON: {e}"))))?;

    let Value::Object(map) = &value else {
        return Err(reject(
            None,
            EventError::InvalidEvent("event must be a JSON object".to_string()),
        ));
    };

    let event_id = map
        .get("event_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(event_type) = map.get("type").and_then(Value::as_str) else {
        return Err(reject(
            event_id,
            EventError::InvalidEvent("missing or invalid `type` field".to_string()),
        ));
    };

    if !CLIENT_EVENT_TYPES.contains(&event_type) {
        let unsupported = EventError::UnsupportedEvent(event_type.to_string());
        return Err(reject(event_id, unsupported));
    }

    match serde_json::from_value::<ClientEvent>(value) {
        Ok(event) => Ok(InboundEvent { event_id, event }),
        Err(e) => Err(reject(event_id, EventError::InvalidEvent(e.to_string()))),
    }
}

// =============================================================================
// Server events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    #[serde(rename = "session.created")]
    SessionCreated { session: Session },

    #[serde(rename = "session.updated")]
    SessionUpdated { session: Session },

    #[serde(rename = "conversation.created")]
    ConversationCreated { conversation: ConversationResource },

    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        previous_item_id: Option<String>,
        item_id: String,
    },

    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared {},

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "conversation.item.updated")]
    ConversationItemUpdated {
        item_id: String,
        item: ConversationItem,
    },

    #[serde(rename = "conversation.item.truncated")]
    ConversationItemTruncated {
        item_id: String,
        content_index: usize,
        audio_end_ms: u64,
    },

    #[serde(rename = "conversation.item.deleted")]
    ConversationItemDeleted { item_id: String },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        item_id: String,
        content_index: usize,
        transcript: String,
    },

    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseResource },

    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseResource },

    #[serde(rename = "response.output_item.added")]
    ResponseOutputItemAdded {
        response_id: String,
        output_index: usize,
        item: ConversationItem,
    },

    #[serde(rename = "response.output_item.done")]
    ResponseOutputItemDone {
        response_id: String,
        output_index: usize,
        item: ConversationItem,
    },

    #[serde(rename = "response.content_part.added")]
    ResponseContentPartAdded {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },

    #[serde(rename = "response.content_part.done")]
    ResponseContentPartDone {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
        transcript: String,
    },

    /// Base64 audio chunk
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
        delta: String,
    },

    #[serde(rename = "response.audio.done")]
    ResponseAudioDone {
        response_id: String,
        item_id: String,
        output_index: usize,
        content_index: usize,
    },
}

impl ServerEvent {
    pub fn error(detail: ErrorDetail) -> Self {
        Self::Error { error: detail }
    }
}

/// A server event stamped with its unique `event_id`; serializes to one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl OutboundEvent {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event_id: new_id("event"),
            event,
        }
    }
}

/// Message routing for the socket's sender task
#[derive(Debug)]
pub enum RealtimeMessageRoute {
    /// JSON event frame
    Outgoing(OutboundEvent),
    /// Close connection
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_deserialization() {
        let event = parse_client_event(
            r#"{"type":"session.update","event_id":"evt_1","session":{"voice":"echo","turn_detection":null}}"#,
        )
        .expect("Should parse");

        assert_eq!(event.event_id.as_deref(), Some("evt_1"));
        match event.event {
            ClientEvent::SessionUpdate { session } => {
                assert_eq!(session.voice.as_deref(), Some("echo"));
                assert_eq!(session.turn_detection, Some(None));
                assert!(session.instructions.is_none());
                assert!(session.input_audio_transcription.is_none());
            }
            _ => panic!("Expected SessionUpdate variant"),
        }
    }

    #[test]
    fn test_commit_with_extra_fields() {
        let event = parse_client_event(r#"{"type":"input_audio_buffer.commit","event_id":"e"}"#)
            .expect("Should parse");
        assert_eq!(event.event, ClientEvent::InputAudioBufferCommit {});
    }

    #[test]
    fn test_missing_type_is_invalid_event() {
        let rejected = parse_client_event(r#"{"audio":"AAAA"}"#).unwrap_err();
        assert!(matches!(rejected.error, EventError::InvalidEvent(_)));

        let rejected = parse_client_event(r#"{"type":42}"#).unwrap_err();
        assert!(matches!(rejected.error, EventError::InvalidEvent(_)));

        let rejected = parse_client_event("not json").unwrap_err();
        assert!(matches!(rejected.error, EventError::InvalidEvent(_)));

        let rejected = parse_client_event("[1,2]").unwrap_err();
        assert!(matches!(rejected.error, EventError::InvalidEvent(_)));
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let rejected =
            parse_client_event(r#"{"type":"bogus.event","event_id":"evt_9"}"#).unwrap_err();
        assert_eq!(
            rejected.error,
            EventError::UnsupportedEvent("bogus.event".to_string())
        );
        assert_eq!(rejected.event_id.as_deref(), Some("evt_9"));
        assert_eq!(rejected.error.code(), "invalid_event");
    }

    #[test]
    fn test_known_type_with_bad_fields_is_invalid() {
        let rejected = parse_client_event(r#"{"type":"input_audio_buffer.append"}"#).unwrap_err();
        assert!(matches!(rejected.error, EventError::InvalidEvent(_)));
    }

    #[test]
    fn test_item_create_requires_role_for_messages() {
        let event = parse_client_event(
            r#"{"type":"conversation.item.create","item":{"type":"message","content":[{"type":"input_text","text":"hi"}]}}"#,
        )
        .expect("Should parse");
        let ClientEvent::ConversationItemCreate { item, .. } = event.event else {
            panic!("Expected ConversationItemCreate variant");
        };
        assert!(matches!(item.into_item(), Err(EventError::InvalidEvent(_))));
    }

    #[test]
    fn test_item_create_into_item() {
        let event = parse_client_event(
            r#"{"type":"conversation.item.create","item":{"type":"message","role":"user","content":[{"type":"input_text","text":"hi"}]}}"#,
        )
        .expect("Should parse");
        let ClientEvent::ConversationItemCreate {
            item,
            previous_item_id,
        } = event.event
        else {
            panic!("Expected ConversationItemCreate variant");
        };
        assert!(previous_item_id.is_none());

        let item = item.into_item().unwrap();
        assert!(item.id.starts_with("item_"));
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.role, Some(Role::User));
        assert_eq!(item.text(), "hi");
    }

    #[test]
    fn test_server_event_serialization() {
        let event = OutboundEvent::new(ServerEvent::InputAudioBufferCommitted {
            previous_item_id: None,
            item_id: "item_1".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.committed");
        assert_eq!(json["item_id"], "item_1");
        assert!(json["previous_item_id"].is_null());
        assert!(json["event_id"].as_str().unwrap().starts_with("event_"));

        let cleared =
            serde_json::to_value(OutboundEvent::new(ServerEvent::InputAudioBufferCleared {}))
                .unwrap();
        assert_eq!(cleared["type"], "input_audio_buffer.cleared");
    }

    #[test]
    fn test_error_event_shape() {
        let detail = ErrorDetail::from_event_error(
            &EventError::UnsupportedEvent("bogus.event".to_string()),
            Some("evt_1".to_string()),
        );
        let json = serde_json::to_value(OutboundEvent::new(ServerEvent::error(detail))).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "invalid_event");
        assert_eq!(json["error"]["code"], "invalid_event");
        assert_eq!(json["error"]["event_id"], "evt_1");
        assert!(json["error"]["param"].is_null());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = OutboundEvent::new(ServerEvent::InputAudioBufferCleared {});
        let b = OutboundEvent::new(ServerEvent::InputAudioBufferCleared {});
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_item_status_is_monotonic() {
        let mut item = ConversationItem::message(Role::Assistant, ItemStatus::InProgress, vec![]);
        assert!(item.advance_status(ItemStatus::Completed));
        assert!(!item.advance_status(ItemStatus::InProgress));
        assert!(!item.advance_status(ItemStatus::Incomplete));
        assert_eq!(item.status, ItemStatus::Completed);
    }

    #[test]
    fn test_content_part_tags() {
        let part: ContentPart = serde_json::from_str(r#"{"type":"input_audio"}"#).unwrap();
        assert_eq!(
            part,
            ContentPart::InputAudio {
                audio: None,
                transcript: None
            }
        );
        let json = serde_json::to_value(ContentPart::Audio {
            audio: None,
            transcript: Some("hi".to_string()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "audio", "transcript": "hi"}));
    }
}
