//! Realtime audio WebSocket endpoint
//!
//! Speaks the realtime event protocol to clients and relays the work to vendor tasks.
//!
//! ## Client → Server
//!
//! - `session.update`: partial update of the session settings
//! - `input_audio_buffer.append` / `.commit` / `.clear`: buffered PCM16 input
//! - `conversation.item.create` / `.truncate` / `.delete`: conversation history edits
//! - `response.create` / `response.cancel`: spoken response lifecycle
//! - Binary frames: raw PCM16 appended to the input buffer
//!
//! ## Server → Client
//!
//! - `session.created` / `session.updated`, `conversation.created`
//! - `input_audio_buffer.committed` / `.cleared`
//! - `conversation.item.created` / `.updated` / `.truncated` / `.deleted`
//! - `conversation.item.input_audio_transcription.completed`
//! - `response.created`, `response.output_item.added` / `.done`,
//!   `response.content_part.added` / `.done`, `response.audio_transcript.delta` / `.done`,
//!   `response.audio.delta` / `.done`, `response.done`
//! - `error`: any rejected client event or failed background task

mod connection;
pub mod error;
mod handler;
pub mod messages;
mod orchestration;
pub mod session;

pub use connection::{ConnectionPhase, EventSender, RealtimeConnection, RealtimeServices};
pub use error::{EventError, EventResult};
pub use handler::{REALTIME_SUBPROTOCOL, RealtimeQuery, realtime_handler};
