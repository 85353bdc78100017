//! Voice/capability translation between the realtime API and the vendor task protocol.
//!
//! Everything here is a pure function over static tables: no state, no I/O.
//!
//! - `voices`: client voice names to vendor voice identifiers
//! - `models`: supported-model allow-list, capabilities, reasoning-effort suffixes
//! - `protocol`: realtime requests to vendor `run-task` commands, vendor sentences to
//!   transcript fragments, content types and text segmentation

pub mod models;
pub mod protocol;
pub mod voices;

pub use models::{
    DEFAULT_REALTIME_MODEL, ModelCapability, RealtimeModel, ReasoningEffort, SYNTHESIS_MODEL,
    TranscriptionBackend, is_supported_model, split_reasoning_effort, supported_models,
};
pub use protocol::{
    DEFAULT_HTTP_FORMAT, DEFAULT_HTTP_SAMPLE_RATE, REALTIME_PCM_SAMPLE_RATE, TranscriptAssembler,
    TranscriptFragment, content_type_for_format, segment_text, synthesis_run_task,
    transcription_run_task,
};
pub use voices::{DEFAULT_VENDOR_VOICE, is_known_voice, map_voice, resolve_voice};
