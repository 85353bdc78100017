//! Correspondence between realtime events and vendor task commands/events.

use crate::core::vendor::messages::{RunTaskSpec, Sentence, TaskKind, TaskParameters};

use super::models::{SYNTHESIS_MODEL, TranscriptionBackend};
use super::voices::resolve_voice;

/// Sample rate of the realtime API's `pcm16` format.
pub const REALTIME_PCM_SAMPLE_RATE: u32 = 24000;

/// Sample rate for container formats on the HTTP path.
pub const DEFAULT_HTTP_SAMPLE_RATE: u32 = 22050;

/// Container used by the HTTP path when none is requested.
pub const DEFAULT_HTTP_FORMAT: &str = "mp3";

/// Content type for a synthesized audio container.
pub fn content_type_for_format(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "opus" => "audio/opus",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "pcm" => "audio/pcm",
        _ => "audio/mpeg",
    }
}

/// `run-task` for speech synthesis in the given voice and container.
pub fn synthesis_run_task(voice: Option<&str>, format: &str, sample_rate: u32) -> RunTaskSpec {
    RunTaskSpec {
        kind: TaskKind::Tts,
        model: SYNTHESIS_MODEL.to_string(),
        parameters: TaskParameters {
            text_type: Some("PlainText".to_string()),
            voice: Some(resolve_voice(voice)),
            format: Some(format.to_string()),
            sample_rate: Some(sample_rate),
            volume: Some(50),
            rate: Some(1.0),
            pitch: Some(1.0),
            ..Default::default()
        },
    }
}

/// `run-task` that starts recognition of a committed audio buffer.
pub fn transcription_run_task(backend: TranscriptionBackend) -> RunTaskSpec {
    RunTaskSpec {
        kind: TaskKind::Asr,
        model: backend.model.to_string(),
        parameters: TaskParameters {
            format: Some("pcm".to_string()),
            sample_rate: Some(backend.sample_rate),
            punctuation_prediction_enabled: Some(true),
            inverse_text_normalization_enabled: Some(true),
            max_sentence_silence: Some(800),
            ..Default::default()
        },
    }
}

// =============================================================================
// Transcripts
// =============================================================================

/// One transcript update relayed from an ASR task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    /// The vendor marked this as the final revision of its sentence.
    pub is_final: bool,
}

impl From<&Sentence> for TranscriptFragment {
    fn from(sentence: &Sentence) -> Self {
        Self {
            text: sentence.text.clone(),
            is_final: sentence.sentence_end,
        }
    }
}

/// Folds a stream of transcript fragments into the final transcript.
///
/// The vendor revises a sentence several times before marking it final. Only final
/// revisions are kept; an unfinished trailing sentence is appended when the task ends.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    finished: String,
    pending: Option<String>,
}

impl TranscriptAssembler {
    pub fn push(&mut self, fragment: TranscriptFragment) {
        if fragment.is_final {
            self.finished.push_str(&fragment.text);
            self.pending = None;
        } else {
            self.pending = Some(fragment.text);
        }
    }

    pub fn finish(self) -> String {
        let mut transcript = self.finished;
        if let Some(pending) = self.pending {
            transcript.push_str(&pending);
        }
        transcript
    }
}

/// Split response text into the segments streamed as `continue-task` commands.
///
/// Boundaries follow sentence punctuation (ASCII and CJK); punctuation stays with the
/// preceding segment and whitespace-only pieces are dropped. Concatenating the segments
/// gives back the input minus leading/trailing whitespace between segments.
pub fn segment_text(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | ';' | '\n' | '。' | '！' | '？' | '；') {
            push_segment(&mut segments, &mut current);
        }
    }
    push_segment(&mut segments, &mut current);

    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let segment = std::mem::take(current);
    if segment.trim().is_empty() {
        return;
    }
    // Keep inter-sentence spacing on the segment that follows it.
    if segments.is_empty() {
        segments.push(segment.trim_start().to_string());
    } else {
        segments.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for_format("mp3"), "audio/mpeg");
        assert_eq!(content_type_for_format("wav"), "audio/wav");
        assert_eq!(content_type_for_format("opus"), "audio/opus");
        assert_eq!(content_type_for_format("aac"), "audio/aac");
        assert_eq!(content_type_for_format("flac"), "audio/flac");
        assert_eq!(content_type_for_format("pcm"), "audio/pcm");
        assert_eq!(content_type_for_format(""), "audio/mpeg");
    }

    #[test]
    fn test_synthesis_run_task_maps_voice() {
        let task = synthesis_run_task(Some("echo"), "pcm", 24000);
        assert_eq!(task.kind, TaskKind::Tts);
        assert_eq!(task.model, "cosyvoice-v2");
        assert_eq!(task.parameters.voice.as_deref(), Some("longnan_v2"));
        assert_eq!(task.parameters.text_type.as_deref(), Some("PlainText"));
        assert_eq!(task.parameters.volume, Some(50));

        let task = synthesis_run_task(None, "mp3", 22050);
        assert_eq!(task.parameters.voice.as_deref(), Some("longxiaochun_v2"));
    }

    #[test]
    fn test_transcription_run_task() {
        let task = transcription_run_task(TranscriptionBackend {
            model: "paraformer-realtime-8k-v2",
            sample_rate: 8000,
        });
        assert_eq!(task.kind, TaskKind::Asr);
        assert_eq!(task.model, "paraformer-realtime-8k-v2");
        assert_eq!(task.parameters.sample_rate, Some(8000));
        assert_eq!(task.parameters.format.as_deref(), Some("pcm"));
        assert!(task.parameters.voice.is_none());
    }

    #[test]
    fn test_transcript_assembler_keeps_final_revisions() {
        let mut assembler = TranscriptAssembler::default();
        for (text, is_final) in [
            ("hel", false),
            ("hello", false),
            ("Hello.", true),
            (" How", false),
            (" How are you?", true),
            (" Bye", false),
        ] {
            assembler.push(TranscriptFragment {
                text: text.to_string(),
                is_final,
            });
        }
        assert_eq!(assembler.finish(), "Hello. How are you? Bye");
    }

    #[test]
    fn test_segment_text() {
        assert_eq!(
            segment_text("Hello there. How are you?"),
            vec!["Hello there.".to_string(), " How are you?".to_string()]
        );
        assert_eq!(
            segment_text("你好。今天天气不错！"),
            vec!["你好。".to_string(), "今天天气不错！".to_string()]
        );
        assert_eq!(segment_text("no punctuation"), vec!["no punctuation"]);
        assert!(segment_text("   ").is_empty());
    }

    #[test]
    fn test_segments_concatenate_to_trimmed_text() {
        let text = "One. Two! Three";
        assert_eq!(segment_text(text).concat(), text);
    }
}
