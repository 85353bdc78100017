//! Text completion backend used to produce the words of a spoken response.
//!
//! Completion itself is a plain request/response call with no protocol state, so the
//! realtime core only sees the [`CompletionBackend`] trait.

mod echo;
mod http;

pub use echo::EchoCompletion;
pub use http::HttpCompletion;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: CompletionRole,
    pub content: String,
}

impl CompletionMessage {
    pub fn new(role: CompletionRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Conversation context handed to the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub instructions: Option<String>,
    pub messages: Vec<CompletionMessage>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("Nothing to respond to: the conversation has no text")]
    EmptyConversation,
}

impl CompletionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Request(_) | Self::Status { .. } | Self::InvalidResponse(_) => {
                "completion_error"
            }
            Self::EmptyConversation => "empty_conversation",
        }
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;

/// Produces the text of an assistant reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
