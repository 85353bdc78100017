use async_trait::async_trait;

use super::{
    CompletionBackend, CompletionError, CompletionRequest, CompletionResult, CompletionRole,
};

/// Speaks back the latest user text.
///
/// Used when no completion endpoint is configured, which turns a synthesis-only
/// deployment into plain text-to-speech over the realtime protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoCompletion;

#[async_trait]
impl CompletionBackend for EchoCompletion {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String> {
        request
            .messages
            .iter()
            .rev()
            .find(|message| {
                message.role == CompletionRole::User && !message.content.trim().is_empty()
            })
            .map(|message| message.content.clone())
            .ok_or(CompletionError::EmptyConversation)
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
