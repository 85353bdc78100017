//! Per-connection session settings, conversation history, and input audio buffer.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::core::completion::{CompletionMessage, CompletionRole};

use super::error::{EventError, EventResult};
use super::messages::{
    ContentPart, ConversationItem, ConversationResource, InputAudioTranscription,
    MAX_AUDIO_APPEND_SIZE, MAX_INSTRUCTIONS_SIZE, MaxTokens, Role, SessionUpdate, ToolDefinition,
    TurnDetection, new_id,
};

/// Voice used until the client picks one.
pub const DEFAULT_VOICE: &str = "alloy";

/// System prompt a session starts with until `session.update` replaces it.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful AI assistant. Reply in a natural, friendly tone.";

/// Only audio format the realtime path speaks.
pub const PCM16: &str = "pcm16";

const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Session resource as sent in `session.created` and `session.updated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    /// Unix seconds
    pub expires_at: u64,
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: Option<InputAudioTranscription>,
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
    pub temperature: f32,
    pub max_response_output_tokens: MaxTokens,
}

impl Session {
    pub fn new(model: &str, ttl: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            id: new_id("sess"),
            object: "realtime.session",
            model: model.to_string(),
            expires_at: (now + ttl).as_secs(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            input_audio_format: PCM16.to_string(),
            output_audio_format: PCM16.to_string(),
            input_audio_transcription: None,
            turn_detection: Some(TurnDetection::default()),
            tools: Vec::new(),
            tool_choice: "auto".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_response_output_tokens: MaxTokens::infinite(),
        }
    }

    /// Merge a `session.update`. Nothing changes if the update is rejected.
    pub fn apply(&mut self, update: SessionUpdate) -> EventResult<()> {
        if let Some(instructions) = &update.instructions
            && instructions.len() > MAX_INSTRUCTIONS_SIZE
        {
            return Err(EventError::TooLarge {
                field: "instructions",
                max: MAX_INSTRUCTIONS_SIZE,
            });
        }
        for (field, format) in [
            ("input_audio_format", &update.input_audio_format),
            ("output_audio_format", &update.output_audio_format),
        ] {
            if let Some(format) = format
                && format != PCM16
            {
                return Err(EventError::InvalidEvent(format!(
                    "{field} `{format}` is not supported, use `{PCM16}`"
                )));
            }
        }
        if let Some(temperature) = update.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(EventError::InvalidEvent(format!(
                "temperature {temperature} is outside 0.0..=2.0"
            )));
        }

        if let Some(modalities) = update.modalities {
            self.modalities = modalities;
        }
        if let Some(instructions) = update.instructions {
            self.instructions = instructions;
        }
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(transcription) = update.input_audio_transcription {
            self.input_audio_transcription = transcription;
        }
        match update.turn_detection {
            None => {}
            Some(None) => self.turn_detection = None,
            Some(Some(partial)) => {
                let mut merged = self.turn_detection.take().unwrap_or_default();
                partial.apply_to(&mut merged);
                self.turn_detection = Some(merged);
            }
        }
        if let Some(tools) = update.tools {
            self.tools = tools;
        }
        if let Some(tool_choice) = update.tool_choice {
            self.tool_choice = tool_choice;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = update.max_response_output_tokens {
            self.max_response_output_tokens = max_tokens;
        }
        Ok(())
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Ordered item history of one connection.
#[derive(Debug)]
pub struct Conversation {
    id: String,
    items: Vec<ConversationItem>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: new_id("conv"),
            items: Vec::new(),
        }
    }
}

impl Conversation {
    pub fn resource(&self) -> ConversationResource {
        ConversationResource {
            id: self.id.clone(),
            object: "realtime.conversation",
        }
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    pub fn last_item_id(&self) -> Option<String> {
        self.items.last().map(|item| item.id.clone())
    }

    pub fn get(&self, item_id: &str) -> Option<&ConversationItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Append at the end. Returns the id of the item it now follows.
    pub fn append(&mut self, item: ConversationItem) -> Option<String> {
        let previous = self.last_item_id();
        self.items.push(item);
        previous
    }

    /// Insert after `previous_item_id`, or at the end when it is `None`.
    pub fn insert_after(
        &mut self,
        previous_item_id: Option<&str>,
        item: ConversationItem,
    ) -> EventResult<Option<String>> {
        if self.get(&item.id).is_some() {
            return Err(EventError::InvalidEvent(format!(
                "item {} already exists",
                item.id
            )));
        }

        let Some(previous_id) = previous_item_id else {
            return Ok(self.append(item));
        };

        let position = self
            .items
            .iter()
            .position(|existing| existing.id == previous_id)
            .ok_or_else(|| EventError::ItemNotFound(previous_id.to_string()))?;
        self.items.insert(position + 1, item);
        Ok(Some(previous_id.to_string()))
    }

    /// Apply `update` to an item in place and return a snapshot of the result.
    pub fn update_item(
        &mut self,
        item_id: &str,
        update: impl FnOnce(&mut ConversationItem),
    ) -> Option<ConversationItem> {
        let item = self.items.iter_mut().find(|item| item.id == item_id)?;
        update(item);
        Some(item.clone())
    }

    pub fn delete(&mut self, item_id: &str) -> EventResult<ConversationItem> {
        let position = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| EventError::ItemNotFound(item_id.to_string()))?;
        Ok(self.items.remove(position))
    }

    /// Cut an item's audio at `content_index`: its transcript is cleared and any
    /// later parts are dropped.
    pub fn truncate(&mut self, item_id: &str, content_index: usize) -> EventResult<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| EventError::ItemNotFound(item_id.to_string()))?;

        let invalid = || EventError::InvalidContentIndex {
            item_id: item_id.to_string(),
            index: content_index,
        };
        let part = item.content.get_mut(content_index).ok_or_else(invalid)?;
        if !part.is_audio() {
            return Err(invalid());
        }

        part.set_transcript(None);
        item.content.truncate(content_index + 1);
        Ok(())
    }

    /// Message history in completion form; items without text are skipped.
    pub fn completion_messages(&self) -> Vec<CompletionMessage> {
        self.items
            .iter()
            .filter_map(|item| {
                let role = match item.role? {
                    Role::User => CompletionRole::User,
                    Role::Assistant => CompletionRole::Assistant,
                    Role::System => CompletionRole::System,
                };
                let text = item.text();
                (!text.trim().is_empty()).then(|| CompletionMessage::new(role, text))
            })
            .collect()
    }
}

// =============================================================================
// Input audio buffer
// =============================================================================

/// Most PCM held between commits (32 MiB, about eleven minutes of 24 kHz PCM16).
pub const MAX_INPUT_AUDIO_BUFFER_SIZE: usize = 32 * 1024 * 1024;

/// Decode a base64 `input_audio_buffer.append` payload.
pub fn decode_audio(audio: &str) -> EventResult<Vec<u8>> {
    if audio.len() > MAX_AUDIO_APPEND_SIZE {
        return Err(EventError::TooLarge {
            field: "audio",
            max: MAX_AUDIO_APPEND_SIZE,
        });
    }
    BASE64
        .decode(audio)
        .map_err(|e| EventError::InvalidAudio(e.to_string()))
}

/// PCM appended since the last commit or clear.
#[derive(Debug)]
pub struct AudioAccumulator {
    buffer: BytesMut,
    limit: usize,
}

impl Default for AudioAccumulator {
    fn default() -> Self {
        Self::with_limit(MAX_INPUT_AUDIO_BUFFER_SIZE)
    }
}

impl AudioAccumulator {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            limit,
        }
    }

    /// Append PCM. A chunk that would push the buffer past its limit is refused whole.
    pub fn append(&mut self, pcm: &[u8]) -> EventResult<usize> {
        if self.buffer.len() + pcm.len() > self.limit {
            return Err(EventError::TooLarge {
                field: "input_audio_buffer",
                max: self.limit,
            });
        }
        self.buffer.extend_from_slice(pcm);
        Ok(pcm.len())
    }

    /// Take the buffered audio, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        std::mem::take(&mut self.buffer).freeze()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Content part recording a committed input audio buffer.
pub fn input_audio_part() -> ContentPart {
    ContentPart::InputAudio {
        audio: None,
        transcript: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::realtime::messages::{ItemStatus, TurnDetectionUpdate};

    fn text_item(role: Role, text: &str) -> ConversationItem {
        ConversationItem::message(
            role,
            ItemStatus::Completed,
            vec![ContentPart::InputText {
                text: text.to_string(),
            }],
        )
    }

    #[test]
    fn test_session_defaults() {
        let session = Session::new("cosyvoice-v2", Duration::from_secs(60));
        assert!(session.id.starts_with("sess_"));
        assert_eq!(session.voice, "alloy");
        assert_eq!(session.input_audio_format, "pcm16");
        assert_eq!(session.tool_choice, "auto");
        assert_eq!(session.instructions, DEFAULT_INSTRUCTIONS);
        assert!(session.input_audio_transcription.is_none());

        let vad = session.turn_detection.unwrap();
        assert_eq!(vad.detection_type, "server_vad");
        assert_eq!(vad.prefix_padding_ms, 300);

        let json = serde_json::to_value(Session::new("m", Duration::ZERO)).unwrap();
        assert_eq!(json["max_response_output_tokens"], "inf");
        assert_eq!(json["object"], "realtime.session");
    }

    #[test]
    fn test_session_apply_merges_fields() {
        let mut session = Session::new("cosyvoice-v2", Duration::from_secs(60));
        let update = SessionUpdate {
            voice: Some("echo".to_string()),
            turn_detection: Some(Some(TurnDetectionUpdate {
                threshold: Some(0.7),
                ..Default::default()
            })),
            input_audio_transcription: Some(Some(InputAudioTranscription { model: None })),
            ..Default::default()
        };
        session.apply(update).unwrap();

        assert_eq!(session.voice, "echo");
        let vad = session.turn_detection.as_ref().unwrap();
        assert_eq!(vad.threshold, 0.7);
        assert_eq!(vad.silence_duration_ms, 200);
        assert!(session.input_audio_transcription.is_some());

        session
            .apply(SessionUpdate {
                turn_detection: Some(None),
                ..Default::default()
            })
            .unwrap();
        assert!(session.turn_detection.is_none());
        assert_eq!(session.voice, "echo");
    }

    #[test]
    fn test_session_apply_rejects_without_partial_change() {
        let mut session = Session::new("cosyvoice-v2", Duration::from_secs(60));
        let result = session.apply(SessionUpdate {
            voice: Some("echo".to_string()),
            output_audio_format: Some("g711_ulaw".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(EventError::InvalidEvent(_))));
        assert_eq!(session.voice, "alloy");

        let too_long = "x".repeat(MAX_INSTRUCTIONS_SIZE + 1);
        let result = session.apply(SessionUpdate {
            instructions: Some(too_long),
            ..Default::default()
        });
        assert!(matches!(result, Err(EventError::TooLarge { .. })));
    }

    #[test]
    fn test_conversation_insert_after() {
        let mut conversation = Conversation::default();
        let first = text_item(Role::User, "one");
        let first_id = first.id.clone();
        assert_eq!(conversation.append(first), None);
        let third = text_item(Role::User, "three");
        assert_eq!(conversation.append(third), Some(first_id.clone()));

        let second = text_item(Role::User, "two");
        let previous = conversation
            .insert_after(Some(&first_id), second)
            .unwrap();
        assert_eq!(previous, Some(first_id));

        let texts: Vec<String> = conversation.items().iter().map(|i| i.text()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);

        let orphan = text_item(Role::User, "four");
        let result = conversation.insert_after(Some("item_missing"), orphan);
        assert_eq!(
            result,
            Err(EventError::ItemNotFound("item_missing".to_string()))
        );
    }

    #[test]
    fn test_conversation_delete() {
        let mut conversation = Conversation::default();
        let item = text_item(Role::User, "hi");
        let id = item.id.clone();
        conversation.append(item);

        assert_eq!(conversation.delete(&id).unwrap().id, id);
        assert!(conversation.items().is_empty());
        assert!(matches!(
            conversation.delete(&id),
            Err(EventError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_conversation_truncate() {
        let mut conversation = Conversation::default();
        let item = ConversationItem::message(
            Role::Assistant,
            ItemStatus::Completed,
            vec![
                ContentPart::Audio {
                    audio: None,
                    transcript: Some("hello there".to_string()),
                },
                ContentPart::Text {
                    text: "extra".to_string(),
                },
            ],
        );
        let id = item.id.clone();
        conversation.append(item);

        assert!(matches!(
            conversation.truncate(&id, 1),
            Err(EventError::InvalidContentIndex { index: 1, .. })
        ));
        assert!(matches!(
            conversation.truncate(&id, 5),
            Err(EventError::InvalidContentIndex { .. })
        ));

        conversation.truncate(&id, 0).unwrap();
        let item = conversation.get(&id).unwrap();
        assert_eq!(item.content.len(), 1);
        assert_eq!(item.content[0].text(), None);
    }

    #[test]
    fn test_completion_messages_skip_empty_items() {
        let mut conversation = Conversation::default();
        conversation.append(text_item(Role::User, "hello"));
        conversation.append(ConversationItem::message(
            Role::User,
            ItemStatus::InProgress,
            vec![input_audio_part()],
        ));
        conversation.append(text_item(Role::Assistant, "hi"));

        let messages = conversation.completion_messages();
        assert_eq!(
            messages,
            vec![
                CompletionMessage::new(CompletionRole::User, "hello"),
                CompletionMessage::new(CompletionRole::Assistant, "hi"),
            ]
        );
    }

    #[test]
    fn test_audio_accumulator() {
        let mut buffer = AudioAccumulator::default();
        let decoded = decode_audio("AAECAw==").unwrap();
        assert_eq!(buffer.append(&decoded).unwrap(), 4);
        buffer.append(&[4, 5]).unwrap();
        assert_eq!(buffer.len(), 6);

        let taken = buffer.take();
        assert_eq!(&taken[..], &[0, 1, 2, 3, 4, 5]);
        assert!(buffer.is_empty());

        assert!(matches!(
            decode_audio("not base64!"),
            Err(EventError::InvalidAudio(_))
        ));

        buffer.append(&[1]).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_audio_accumulator_total_limit() {
        let mut buffer = AudioAccumulator::with_limit(8);
        buffer.append(&[0; 6]).unwrap();

        let err = buffer.append(&[0; 3]).unwrap_err();
        assert_eq!(
            err,
            EventError::TooLarge {
                field: "input_audio_buffer",
                max: 8
            }
        );
        assert_eq!(err.param(), Some("input_audio_buffer"));
        assert_eq!(buffer.len(), 6);

        buffer.append(&[0; 2]).unwrap();
        assert_eq!(buffer.len(), 8);

        // Committing frees the room again.
        buffer.take();
        buffer.append(&[0; 8]).unwrap();
    }
}
