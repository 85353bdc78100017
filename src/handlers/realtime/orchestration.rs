//! Background work started by client events: spoken responses and input transcription.
//!
//! Each run owns at most one vendor task. Whatever the outcome (success, vendor failure,
//! timeout, cancellation) the vendor session is closed and the client receives a terminal
//! event, so a response is never left `in_progress`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::completion::{
    CompletionBackend, CompletionError, CompletionRequest, EchoCompletion,
};
use crate::core::translate::{
    ModelCapability, REALTIME_PCM_SAMPLE_RATE, TranscriptAssembler, TranscriptionBackend,
    segment_text, synthesis_run_task, transcription_run_task,
};
use crate::core::vendor::{
    TaskCommand, TaskEvent, TaskKind, TaskStreams, VendorError, VendorTaskManager,
    VendorTaskSession,
};

use super::connection::RealtimeConnection;
use super::messages::{
    ContentPart, ConversationItem, ErrorDetail, ItemStatus, ResponseParams, ResponseResource,
    ResponseStatus, Role, ServerEvent, StatusDetails,
};
/// Bytes of PCM per binary frame sent to a recognition task (100 ms at 16 kHz).
const ASR_CHUNK_BYTES: usize = 3200;

/// Vendor name of the realtime `pcm16` format.
const VENDOR_PCM_FORMAT: &str = "pcm";

const OUTPUT_INDEX: usize = 0;
const CONTENT_INDEX: usize = 0;

#[derive(Debug, Error)]
enum RunError {
    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl RunError {
    fn detail(&self) -> ErrorDetail {
        let code = match self {
            Self::Cancelled => "cancelled",
            Self::Vendor(e) => e.code(),
            Self::Completion(e) => e.code(),
        };
        ErrorDetail::new(code, self.to_string())
    }
}

/// Ids a run hands back so cleanup works even when the run future is dropped.
#[derive(Debug, Default)]
struct RunResources {
    item_id: Option<String>,
    task_id: Option<String>,
}

fn audio_part(transcript: Option<String>) -> ContentPart {
    ContentPart::Audio {
        audio: None,
        transcript,
    }
}

impl RealtimeConnection {
    pub(super) fn spawn_response(
        self: &Arc<Self>,
        response_id: String,
        params: ResponseParams,
        cancel: CancellationToken,
    ) {
        let connection = self.clone();
        self.spawn(async move {
            connection.run_response(response_id, params, cancel).await;
        });
    }

    pub(super) fn spawn_transcription(
        self: &Arc<Self>,
        item_id: String,
        audio: Bytes,
        backend: TranscriptionBackend,
    ) {
        let connection = self.clone();
        let cancel = self.child_token();
        self.spawn(async move {
            connection
                .run_transcription(item_id, audio, backend, cancel)
                .await;
        });
    }

    fn manager(&self) -> &VendorTaskManager {
        &self.services.manager
    }

    /// Open a vendor task and wait for the vendor to start it.
    async fn open_task(
        &self,
        kind: TaskKind,
        command: TaskCommand,
        resources: &mut RunResources,
    ) -> Result<(Arc<VendorTaskSession>, TaskStreams), RunError> {
        let credentials = self
            .services
            .credentials
            .as_ref()
            .ok_or(VendorError::MissingCredentials)?;

        let task_id = VendorTaskManager::new_task_id(kind);
        resources.task_id = Some(task_id.clone());

        let (session, streams) = self.manager().create_session(credentials, &task_id).await?;
        self.manager().send_command(&session, command).await?;
        session
            .wait_started(self.manager().config().task_timeout)
            .await?;
        Ok((session, streams))
    }

    // =========================================================================
    // Responses
    // =========================================================================

    async fn run_response(
        self: Arc<Self>,
        response_id: String,
        params: ResponseParams,
        cancel: CancellationToken,
    ) {
        let mut resources = RunResources::default();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunError::Cancelled),
            result = self.generate_response(&response_id, &params, &mut resources) => result,
        };

        if let Some(task_id) = &resources.task_id {
            self.manager().close_session(task_id).await;
        }

        // Free the slot first so a client reacting to `response.done` can start the next one.
        self.clear_active_response(&response_id);
        self.finish_response(&response_id, resources.item_id, outcome)
            .await;
    }

    async fn generate_response(
        &self,
        response_id: &str,
        params: &ResponseParams,
        resources: &mut RunResources,
    ) -> Result<String, RunError> {
        let text = self.complete_text(params).await?;

        let item = ConversationItem::message(
            Role::Assistant,
            ItemStatus::InProgress,
            vec![audio_part(None)],
        );
        let item_id = item.id.clone();
        let previous_item_id = self.conversation.lock().append(item.clone());
        resources.item_id = Some(item_id.clone());

        self.events
            .send(ServerEvent::ResponseOutputItemAdded {
                response_id: response_id.to_string(),
                output_index: OUTPUT_INDEX,
                item: item.clone(),
            })
            .await;
        self.events
            .send(ServerEvent::ConversationItemCreated {
                previous_item_id,
                item,
            })
            .await;
        self.events
            .send(ServerEvent::ResponseContentPartAdded {
                response_id: response_id.to_string(),
                item_id: item_id.clone(),
                output_index: OUTPUT_INDEX,
                content_index: CONTENT_INDEX,
                part: audio_part(None),
            })
            .await;

        let voice = params
            .voice
            .clone()
            .unwrap_or_else(|| self.session.read().voice.clone());
        let run = TaskCommand::Run(synthesis_run_task(
            Some(&voice),
            VENDOR_PCM_FORMAT,
            REALTIME_PCM_SAMPLE_RATE,
        ));
        let (session, mut streams) = self.open_task(TaskKind::Tts, run, resources).await?;

        let deadline = Instant::now() + self.manager().config().task_timeout;

        let feed = async {
            let mut transcript = String::new();
            for segment in segment_text(&text) {
                self.manager()
                    .send_command(
                        &session,
                        TaskCommand::Continue {
                            text: segment.clone(),
                        },
                    )
                    .await?;
                transcript.push_str(&segment);
                self.events
                    .send(ServerEvent::ResponseAudioTranscriptDelta {
                        response_id: response_id.to_string(),
                        item_id: item_id.clone(),
                        output_index: OUTPUT_INDEX,
                        content_index: CONTENT_INDEX,
                        delta: segment,
                    })
                    .await;
            }
            self.manager()
                .send_command(&session, TaskCommand::Finish)
                .await?;
            Ok::<_, RunError>(transcript)
        };

        let relay = async {
            loop {
                let event = timeout_at(deadline, streams.next_event())
                    .await
                    .map_err(|_| {
                        VendorError::Timeout(format!(
                            "synthesis did not finish within {:?}",
                            self.manager().config().task_timeout
                        ))
                    })?;

                match event {
                    TaskEvent::Audio(audio) => {
                        self.events
                            .send(ServerEvent::ResponseAudioDelta {
                                response_id: response_id.to_string(),
                                item_id: item_id.clone(),
                                output_index: OUTPUT_INDEX,
                                content_index: CONTENT_INDEX,
                                delta: BASE64.encode(&audio),
                            })
                            .await;
                    }
                    TaskEvent::Transcript(_) => {}
                    TaskEvent::Finished => return Ok::<_, RunError>(()),
                    TaskEvent::Failed(error) => return Err(error.into()),
                }
            }
        };

        let (transcript, ()) = tokio::try_join!(feed, relay)?;

        let dropped = session.dropped_audio_frames();
        if dropped > 0 {
            warn!(
                response_id,
                task_id = %session.task_id(),
                dropped,
                "Response audio incomplete, frames dropped under backpressure"
            );
        }

        Ok(transcript)
    }

    /// Text the response will speak.
    ///
    /// Conversational models ask the completion backend; synthesis and transcription
    /// models speak the latest user text back.
    async fn complete_text(&self, params: &ResponseParams) -> Result<String, RunError> {
        let request = {
            let session = self.session.read();
            CompletionRequest {
                instructions: params
                    .instructions
                    .clone()
                    .or_else(|| Some(session.instructions.clone()))
                    .filter(|i| !i.is_empty()),
                messages: self.conversation.lock().completion_messages(),
                temperature: params.temperature.or(Some(session.temperature)),
                max_output_tokens: params
                    .max_response_output_tokens
                    .as_ref()
                    .unwrap_or(&session.max_response_output_tokens)
                    .limit(),
            }
        };

        let backend: &dyn CompletionBackend = match self.model.capability {
            ModelCapability::Conversational => self.services.completion.as_ref(),
            ModelCapability::Synthesis | ModelCapability::Transcription => &EchoCompletion,
        };

        debug!(
            backend = backend.name(),
            messages = request.messages.len(),
            "Completing response text"
        );
        Ok(backend.complete(request).await?)
    }

    async fn finish_response(
        &self,
        response_id: &str,
        item_id: Option<String>,
        outcome: Result<String, RunError>,
    ) {
        let mut response = ResponseResource::in_progress(response_id);

        match outcome {
            Ok(transcript) => {
                let item = item_id.and_then(|id| {
                    self.conversation.lock().update_item(&id, |item| {
                        if let Some(part) = item.content.get_mut(CONTENT_INDEX) {
                            part.set_transcript(Some(transcript.clone()));
                        }
                        item.advance_status(ItemStatus::Completed);
                    })
                });

                if let Some(item) = item {
                    self.emit_output_done(response_id, &item, &transcript).await;
                    response.output.push(item);
                }
                response.status = ResponseStatus::Completed;
                info!(response_id, "Response completed");
            }
            Err(RunError::Cancelled) => {
                if let Some(item) = item_id.and_then(|id| self.mark_incomplete(&id)) {
                    response.output.push(item);
                }
                response.status = ResponseStatus::Cancelled;
                response.status_details = Some(StatusDetails {
                    kind: ResponseStatus::Cancelled,
                    reason: Some("client_cancelled".to_string()),
                    error: None,
                });
                info!(response_id, "Response cancelled");
            }
            Err(error) => {
                warn!(response_id, error = %error, "Response failed");
                let detail = error.detail();
                self.events.send_error(detail.clone()).await;

                if let Some(item) = item_id.and_then(|id| self.mark_incomplete(&id)) {
                    response.output.push(item);
                }
                response.status = ResponseStatus::Failed;
                response.status_details = Some(StatusDetails {
                    kind: ResponseStatus::Failed,
                    reason: None,
                    error: Some(detail),
                });
            }
        }

        self.events
            .send(ServerEvent::ResponseDone { response })
            .await;
    }

    async fn emit_output_done(&self, response_id: &str, item: &ConversationItem, transcript: &str) {
        let response_id = response_id.to_string();
        let item_id = item.id.clone();

        self.events
            .send(ServerEvent::ResponseAudioDone {
                response_id: response_id.clone(),
                item_id: item_id.clone(),
                output_index: OUTPUT_INDEX,
                content_index: CONTENT_INDEX,
            })
            .await;
        self.events
            .send(ServerEvent::ResponseAudioTranscriptDone {
                response_id: response_id.clone(),
                item_id: item_id.clone(),
                output_index: OUTPUT_INDEX,
                content_index: CONTENT_INDEX,
                transcript: transcript.to_string(),
            })
            .await;
        self.events
            .send(ServerEvent::ResponseContentPartDone {
                response_id: response_id.clone(),
                item_id,
                output_index: OUTPUT_INDEX,
                content_index: CONTENT_INDEX,
                part: audio_part(Some(transcript.to_string())),
            })
            .await;
        self.events
            .send(ServerEvent::ResponseOutputItemDone {
                response_id,
                output_index: OUTPUT_INDEX,
                item: item.clone(),
            })
            .await;
    }

    fn mark_incomplete(&self, item_id: &str) -> Option<ConversationItem> {
        self.conversation.lock().update_item(item_id, |item| {
            item.advance_status(ItemStatus::Incomplete);
        })
    }

    // =========================================================================
    // Input transcription
    // =========================================================================

    async fn run_transcription(
        self: Arc<Self>,
        item_id: String,
        audio: Bytes,
        backend: TranscriptionBackend,
        cancel: CancellationToken,
    ) {
        let mut resources = RunResources::default();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunError::Cancelled),
            result = self.transcribe(&audio, backend, &mut resources) => result,
        };

        if let Some(task_id) = &resources.task_id {
            self.manager().close_session(task_id).await;
        }

        match outcome {
            Ok(transcript) => {
                let updated = self.conversation.lock().update_item(&item_id, |item| {
                    if let Some(part) = item.content.get_mut(CONTENT_INDEX) {
                        part.set_transcript(Some(transcript.clone()));
                    }
                    item.advance_status(ItemStatus::Completed);
                });

                let Some(item) = updated else {
                    debug!(item_id = %item_id, "Transcribed item was deleted, dropping transcript");
                    return;
                };

                info!(
                    item_id = %item_id,
                    chars = transcript.chars().count(),
                    "Input audio transcribed"
                );
                self.events
                    .send(ServerEvent::InputAudioTranscriptionCompleted {
                        item_id: item_id.clone(),
                        content_index: CONTENT_INDEX,
                        transcript,
                    })
                    .await;
                self.events
                    .send(ServerEvent::ConversationItemUpdated { item_id, item })
                    .await;
            }
            Err(RunError::Cancelled) => {
                debug!(item_id = %item_id, "Transcription cancelled");
            }
            Err(error) => {
                warn!(item_id = %item_id, error = %error, "Transcription failed");
                self.events.send_error(error.detail()).await;
                if let Some(item) = self.mark_incomplete(&item_id) {
                    self.events
                        .send(ServerEvent::ConversationItemUpdated { item_id, item })
                        .await;
                }
            }
        }
    }

    async fn transcribe(
        &self,
        audio: &Bytes,
        backend: TranscriptionBackend,
        resources: &mut RunResources,
    ) -> Result<String, RunError> {
        let run = TaskCommand::Run(transcription_run_task(backend));
        let (session, mut streams) = self.open_task(TaskKind::Asr, run, resources).await?;

        let deadline = Instant::now() + self.manager().config().task_timeout;

        let feed = async {
            let mut offset = 0;
            while offset < audio.len() {
                let end = (offset + ASR_CHUNK_BYTES).min(audio.len());
                self.manager()
                    .send_audio(&session, audio.slice(offset..end))
                    .await?;
                offset = end;
            }
            self.manager()
                .send_command(&session, TaskCommand::Finish)
                .await?;
            Ok::<_, RunError>(())
        };

        let collect = async {
            let mut assembler = TranscriptAssembler::default();
            loop {
                let event = timeout_at(deadline, streams.next_event())
                    .await
                    .map_err(|_| {
                        VendorError::Timeout(format!(
                            "transcription did not finish within {:?}",
                            self.manager().config().task_timeout
                        ))
                    })?;

                match event {
                    TaskEvent::Transcript(fragment) => assembler.push(fragment),
                    TaskEvent::Audio(_) => {}
                    TaskEvent::Finished => return Ok::<_, RunError>(assembler.finish()),
                    TaskEvent::Failed(error) => return Err(error.into()),
                }
            }
        };

        let ((), transcript) = tokio::try_join!(feed, collect)?;
        Ok(transcript)
    }
}
