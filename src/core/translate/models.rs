//! Model allow-list, capabilities, and the reasoning-effort suffix convention.

use serde::{Deserialize, Serialize};

/// Model assumed when a realtime client does not ask for one.
pub const DEFAULT_REALTIME_MODEL: &str = "cosyvoice-v2";

/// Vendor model that produces speech for every realtime model.
pub const SYNTHESIS_MODEL: &str = "cosyvoice-v2";

/// What a realtime model does with the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCapability {
    /// Speaks text; committed audio is stored but not transcribed.
    Synthesis,
    /// Transcribes every committed audio buffer.
    Transcription,
    /// Generates a reply through the completion backend and speaks it.
    Conversational,
}

/// Vendor ASR model and the PCM sample rate it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionBackend {
    pub model: &'static str,
    pub sample_rate: u32,
}

/// One entry of the supported-model allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeModel {
    pub name: &'static str,
    pub capability: ModelCapability,
    pub transcription: Option<TranscriptionBackend>,
}

const PARAFORMER_8K: TranscriptionBackend = TranscriptionBackend {
    model: "paraformer-realtime-8k-v2",
    sample_rate: 8000,
};

const PARAFORMER_16K: TranscriptionBackend = TranscriptionBackend {
    model: "paraformer-realtime-v2",
    sample_rate: 16000,
};

static SUPPORTED_MODELS: &[RealtimeModel] = &[
    RealtimeModel {
        name: "cosyvoice-v2",
        capability: ModelCapability::Synthesis,
        transcription: None,
    },
    RealtimeModel {
        name: "paraformer-realtime-8k-v2",
        capability: ModelCapability::Transcription,
        transcription: Some(PARAFORMER_8K),
    },
    RealtimeModel {
        name: "gpt-4o-realtime-preview",
        capability: ModelCapability::Conversational,
        transcription: Some(PARAFORMER_16K),
    },
    RealtimeModel {
        name: "gpt-4o-mini-realtime-preview",
        capability: ModelCapability::Conversational,
        transcription: Some(PARAFORMER_16K),
    },
];

impl RealtimeModel {
    /// Find a model on the allow-list.
    pub fn lookup(name: &str) -> Option<&'static RealtimeModel> {
        SUPPORTED_MODELS.iter().find(|model| model.name == name)
    }

    /// Whether a commit should start a transcription task.
    ///
    /// Transcription models always transcribe; conversational models only when the
    /// session asked for input transcription.
    pub fn transcribes_input(&self, transcription_requested: bool) -> bool {
        match self.capability {
            ModelCapability::Transcription => true,
            ModelCapability::Conversational => transcription_requested,
            ModelCapability::Synthesis => false,
        }
    }
}

/// Names on the allow-list, in table order.
pub fn supported_models() -> impl Iterator<Item = &'static str> {
    SUPPORTED_MODELS.iter().map(|model| model.name)
}

pub fn is_supported_model(name: &str) -> bool {
    RealtimeModel::lookup(name).is_some()
}

// =============================================================================
// Reasoning effort
// =============================================================================

/// Structured form of a `-high`/`-medium`/`-low` model suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    High,
    Medium,
    Low,
}

impl ReasoningEffort {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::High => "-high",
            Self::Medium => "-medium",
            Self::Low => "-low",
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip a trailing reasoning-effort suffix from a model name.
///
/// At most one suffix is recognised. A name that is nothing but a suffix is left alone.
pub fn split_reasoning_effort(model: &str) -> (&str, Option<ReasoningEffort>) {
    for effort in [
        ReasoningEffort::High,
        ReasoningEffort::Medium,
        ReasoningEffort::Low,
    ] {
        if let Some(base) = model.strip_suffix(effort.suffix())
            && !base.is_empty()
        {
            return (base, Some(effort));
        }
    }
    (model, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let names: Vec<_> = supported_models().collect();
        assert_eq!(
            names,
            vec![
                "cosyvoice-v2",
                "paraformer-realtime-8k-v2",
                "gpt-4o-realtime-preview",
                "gpt-4o-mini-realtime-preview",
            ]
        );
        assert!(is_supported_model(DEFAULT_REALTIME_MODEL));
        assert!(!is_supported_model("gpt-4o"));
        assert!(!is_supported_model("COSYVOICE-V2"));
    }

    #[test]
    fn test_transcription_capability() {
        let asr = RealtimeModel::lookup("paraformer-realtime-8k-v2").unwrap();
        assert!(asr.transcribes_input(false));
        assert_eq!(asr.transcription.unwrap().sample_rate, 8000);

        let tts = RealtimeModel::lookup("cosyvoice-v2").unwrap();
        assert!(!tts.transcribes_input(true));
        assert!(tts.transcription.is_none());

        let chat = RealtimeModel::lookup("gpt-4o-realtime-preview").unwrap();
        assert!(!chat.transcribes_input(false));
        assert!(chat.transcribes_input(true));
    }

    #[test]
    fn test_split_reasoning_effort() {
        assert_eq!(
            split_reasoning_effort("qwen3-max-high"),
            ("qwen3-max", Some(ReasoningEffort::High))
        );
        assert_eq!(
            split_reasoning_effort("o3-mini-medium"),
            ("o3-mini", Some(ReasoningEffort::Medium))
        );
        assert_eq!(
            split_reasoning_effort("o3-low"),
            ("o3", Some(ReasoningEffort::Low))
        );
        assert_eq!(split_reasoning_effort("qwen-plus"), ("qwen-plus", None));
    }

    #[test]
    fn test_only_one_suffix_is_stripped() {
        assert_eq!(
            split_reasoning_effort("model-low-high"),
            ("model-low", Some(ReasoningEffort::High))
        );
        assert_eq!(split_reasoning_effort("-high"), ("-high", None));
    }

    #[test]
    fn test_effort_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReasoningEffort::Medium).unwrap(),
            "\"medium\""
        );
        assert_eq!(ReasoningEffort::Low.to_string(), "low");
    }
}
