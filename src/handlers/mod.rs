//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `realtime` - Realtime event protocol over WebSocket
//! - `speech` - Non-streaming speech synthesis

pub mod api;
pub mod realtime;
pub mod speech;

pub use realtime::realtime_handler;
pub use speech::speech_handler;
