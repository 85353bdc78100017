//! Non-streaming speech synthesis.
//!
//! `POST /v1/audio/speech` runs one synthesis task to completion and returns the
//! collected audio in the requested container.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::core::translate::{
    DEFAULT_HTTP_FORMAT, DEFAULT_HTTP_SAMPLE_RATE, ModelCapability, RealtimeModel,
    SYNTHESIS_MODEL, content_type_for_format, segment_text, synthesis_run_task,
};
use crate::core::vendor::{
    TaskCommand, TaskEvent, TaskKind, TaskStreams, VendorError, VendorTaskManager,
    VendorTaskSession,
};
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

/// Formats the synthesis task can produce directly.
const SUPPORTED_FORMATS: &[&str] = &["mp3", "wav", "pcm", "opus"];

/// Largest accepted `input`, in bytes
const MAX_INPUT_SIZE: usize = 50 * 1024;

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
}

impl SpeechRequest {
    fn validate(&self) -> AppResult<&'static RealtimeModel> {
        let requested = self.model.as_deref().unwrap_or(SYNTHESIS_MODEL);
        let model = RealtimeModel::lookup(requested)
            .filter(|model| model.capability != ModelCapability::Transcription)
            .ok_or_else(|| AppError::UnsupportedModel(requested.to_string()))?;

        if self.input.trim().is_empty() {
            return Err(AppError::BadRequest("`input` must not be empty".to_string()));
        }
        if self.input.len() > MAX_INPUT_SIZE {
            return Err(AppError::BadRequest(format!(
                "`input` exceeds the maximum of {MAX_INPUT_SIZE} bytes"
            )));
        }
        if let Some(format) = self.response_format.as_deref()
            && !SUPPORTED_FORMATS.contains(&format)
        {
            return Err(AppError::BadRequest(format!(
                "Unsupported response_format `{format}`"
            )));
        }
        Ok(model)
    }
}

/// Synthesize `input` and return the audio bytes.
pub async fn speech_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeechRequest>,
) -> AppResult<Response> {
    let model = request.validate()?;
    let format = request
        .response_format
        .as_deref()
        .unwrap_or(DEFAULT_HTTP_FORMAT);

    let credentials = state
        .vendor_credentials()
        .ok_or(VendorError::MissingCredentials)?;
    let manager = &state.vendor_manager;
    let task_id = VendorTaskManager::new_task_id(TaskKind::Tts);

    info!(
        task_id = %task_id,
        model = model.name,
        format,
        chars = request.input.chars().count(),
        "Speech synthesis requested"
    );

    let (session, streams) = manager.create_session(&credentials, &task_id).await?;
    let result = synthesize(manager, &session, streams, &request, format).await;
    manager.close_session(&task_id).await;

    let audio = result?;
    if audio.is_empty() {
        warn!(task_id = %task_id, "Synthesis finished without audio");
        return Err(AppError::EmptyAudio);
    }

    debug!(task_id = %task_id, bytes = audio.len(), "Speech synthesis complete");
    Ok((
        [(header::CONTENT_TYPE, content_type_for_format(format))],
        audio,
    )
        .into_response())
}

/// Feed the text and collect audio concurrently, so the audio channel drains while
/// commands are still going out.
async fn synthesize(
    manager: &VendorTaskManager,
    session: &VendorTaskSession,
    mut streams: TaskStreams,
    request: &SpeechRequest,
    format: &str,
) -> AppResult<Bytes> {
    let task_timeout = manager.config().task_timeout;
    let deadline = Instant::now() + task_timeout;

    let run = synthesis_run_task(request.voice.as_deref(), format, DEFAULT_HTTP_SAMPLE_RATE);
    manager.send_command(session, TaskCommand::Run(run)).await?;
    session.wait_started(task_timeout).await?;

    let feed = async {
        for segment in segment_text(&request.input) {
            manager
                .send_command(session, TaskCommand::Continue { text: segment })
                .await?;
        }
        manager.send_command(session, TaskCommand::Finish).await
    };

    let collect = async {
        let mut audio = BytesMut::new();
        loop {
            let event = timeout_at(deadline, streams.next_event())
                .await
                .map_err(|_| {
                    VendorError::Timeout(format!(
                        "synthesis did not finish within {}s",
                        task_timeout.as_secs()
                    ))
                })?;
            match event {
                TaskEvent::Audio(chunk) => audio.extend_from_slice(&chunk),
                TaskEvent::Transcript(_) => {}
                TaskEvent::Finished => return Ok::<_, VendorError>(audio),
                TaskEvent::Failed(e) => return Err(e),
            }
        }
    };

    let ((), audio) = tokio::try_join!(feed, collect)?;

    // Dropped frames leave gaps in the encoded container.
    let dropped = session.dropped_audio_frames();
    if dropped > 0 {
        warn!(
            task_id = session.task_id(),
            dropped,
            bytes = audio.len(),
            "Audio frames were dropped during synthesis"
        );
        return Err(AppError::AudioIncomplete { dropped });
    }
    Ok(audio.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> SpeechRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_validate_defaults_to_synthesis_model() {
        let req = request(r#"{"input":"hello"}"#);
        assert_eq!(req.validate().unwrap().name, "cosyvoice-v2");
    }

    #[test]
    fn test_validate_rejects_transcription_model() {
        let req = request(r#"{"model":"paraformer-realtime-8k-v2","input":"hello"}"#);
        assert!(matches!(
            req.validate(),
            Err(AppError::UnsupportedModel(name)) if name == "paraformer-realtime-8k-v2"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(matches!(
            request(r#"{"input":"   "}"#).validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            request(r#"{"input":"hi","response_format":"ogg"}"#).validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(request(r#"{"input":"hi","response_format":"wav"}"#)
            .validate()
            .is_ok());
    }
}
