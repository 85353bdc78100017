//! One client realtime connection: session state, event dispatch, and the background
//! tasks it owns.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::core::completion::CompletionBackend;
use crate::core::translate::RealtimeModel;
use crate::core::vendor::{VendorCredentials, VendorTaskManager};

use super::error::{EventError, EventResult};
use super::messages::{
    ClientEvent, ConversationItem, ErrorDetail, InboundEvent, ItemStatus, MAX_INSTRUCTIONS_SIZE,
    OutboundEvent, RealtimeMessageRoute, RejectedEvent, ResponseParams, ResponseResource, Role,
    ServerEvent, SessionUpdate, new_id, parse_client_event,
};
use super::session::{
    AudioAccumulator, Conversation, PCM16, Session, decode_audio, input_audio_part,
};

/// How long `close` waits for background tasks to observe cancellation.
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared collaborators a connection needs.
#[derive(Clone)]
pub struct RealtimeServices {
    pub manager: Arc<VendorTaskManager>,
    pub credentials: Option<VendorCredentials>,
    pub completion: Arc<dyn CompletionBackend>,
    pub session_ttl: Duration,
}

/// Outbound half of a connection. Every event gets its own `event_id` and frame.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<RealtimeMessageRoute>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<RealtimeMessageRoute>) -> Self {
        Self { tx }
    }

    /// Queue one event. Returns `false` once the socket writer is gone.
    pub async fn send(&self, event: ServerEvent) -> bool {
        self.tx
            .send(RealtimeMessageRoute::Outgoing(OutboundEvent::new(event)))
            .await
            .is_ok()
    }

    pub async fn send_error(&self, detail: ErrorDetail) -> bool {
        self.send(ServerEvent::error(detail)).await
    }

    pub async fn close(&self) {
        let _ = self.tx.send(RealtimeMessageRoute::Close).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Initializing,
    Active,
    Closed,
}

pub(super) struct ActiveResponse {
    pub(super) id: String,
    pub(super) cancel: CancellationToken,
}

pub struct RealtimeConnection {
    pub(super) model: &'static RealtimeModel,
    pub(super) services: RealtimeServices,
    pub(super) session: RwLock<Session>,
    pub(super) conversation: Mutex<Conversation>,
    accumulator: Mutex<AudioAccumulator>,
    pub(super) events: EventSender,
    phase: Mutex<ConnectionPhase>,
    pub(super) active_response: Mutex<Option<ActiveResponse>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl RealtimeConnection {
    pub fn new(
        model: &'static RealtimeModel,
        services: RealtimeServices,
        events: EventSender,
    ) -> Arc<Self> {
        let session = Session::new(model.name, services.session_ttl);
        Arc::new(Self {
            model,
            services,
            session: RwLock::new(session),
            conversation: Mutex::new(Conversation::default()),
            accumulator: Mutex::new(AudioAccumulator::default()),
            events,
            phase: Mutex::new(ConnectionPhase::Initializing),
            active_response: Mutex::new(None),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn session_id(&self) -> String {
        self.session.read().id.clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.lock()
    }

    /// Announce the session and conversation, then start accepting client events.
    pub async fn start(&self) {
        let session = self.session.read().clone();
        let conversation = self.conversation.lock().resource();

        self.events
            .send(ServerEvent::SessionCreated { session })
            .await;
        self.events
            .send(ServerEvent::ConversationCreated { conversation })
            .await;

        let mut phase = self.phase.lock();
        if *phase == ConnectionPhase::Initializing {
            *phase = ConnectionPhase::Active;
        }
    }

    /// Handle one client text frame. Failures become `error` events.
    pub async fn handle_text(self: &Arc<Self>, text: &str) {
        let (event_id, result) = match parse_client_event(text) {
            Ok(InboundEvent { event_id, event }) => (event_id, self.dispatch(event).await),
            Err(RejectedEvent { event_id, error }) => (event_id, Err(error)),
        };

        if let Err(error) = result {
            debug!(code = error.code(), error = %error, "Rejected client event");
            self.events
                .send_error(ErrorDetail::from_event_error(&error, event_id))
                .await;
        }
    }

    /// Binary client frames carry raw PCM and are appended as-is.
    pub async fn handle_audio(&self, pcm: &[u8]) {
        if self.phase() != ConnectionPhase::Active {
            self.events
                .send_error(ErrorDetail::from_event_error(&EventError::NotActive, None))
                .await;
            return;
        }
        let appended = self.accumulator.lock().append(pcm);
        if let Err(error) = appended {
            self.events
                .send_error(ErrorDetail::from_event_error(&error, None))
                .await;
        }
    }

    async fn dispatch(self: &Arc<Self>, event: ClientEvent) -> EventResult<()> {
        if self.phase() != ConnectionPhase::Active {
            return Err(EventError::NotActive);
        }

        match event {
            ClientEvent::SessionUpdate { session } => self.update_session(session).await,
            ClientEvent::InputAudioBufferAppend { audio } => {
                let pcm = decode_audio(&audio)?;
                self.accumulator.lock().append(&pcm)?;
                Ok(())
            }
            ClientEvent::InputAudioBufferCommit {} => self.commit_audio().await,
            ClientEvent::InputAudioBufferClear {} => {
                self.accumulator.lock().clear();
                self.events
                    .send(ServerEvent::InputAudioBufferCleared {})
                    .await;
                Ok(())
            }
            ClientEvent::ConversationItemCreate {
                previous_item_id,
                item,
            } => {
                let item = item.into_item()?;
                let previous_item_id = self
                    .conversation
                    .lock()
                    .insert_after(previous_item_id.as_deref(), item.clone())?;
                self.events
                    .send(ServerEvent::ConversationItemCreated {
                        previous_item_id,
                        item,
                    })
                    .await;
                Ok(())
            }
            ClientEvent::ConversationItemTruncate {
                item_id,
                content_index,
                audio_end_ms,
            } => {
                self.conversation.lock().truncate(&item_id, content_index)?;
                self.events
                    .send(ServerEvent::ConversationItemTruncated {
                        item_id,
                        content_index,
                        audio_end_ms,
                    })
                    .await;
                Ok(())
            }
            ClientEvent::ConversationItemDelete { item_id } => {
                self.conversation.lock().delete(&item_id)?;
                self.events
                    .send(ServerEvent::ConversationItemDeleted { item_id })
                    .await;
                Ok(())
            }
            ClientEvent::ResponseCreate { response } => {
                self.create_response(response.unwrap_or_default()).await
            }
            ClientEvent::ResponseCancel { response_id } => self.cancel_response(response_id),
        }
    }

    async fn update_session(&self, update: SessionUpdate) -> EventResult<()> {
        let session = {
            let mut session = self.session.write();
            session.apply(update)?;
            session.clone()
        };
        self.events
            .send(ServerEvent::SessionUpdated { session })
            .await;
        Ok(())
    }

    async fn commit_audio(self: &Arc<Self>) -> EventResult<()> {
        let audio = self.accumulator.lock().take();
        if audio.is_empty() {
            debug!("Commit on empty input audio buffer ignored");
            return Ok(());
        }

        let requested = self.session.read().input_audio_transcription.is_some();
        let backend = self
            .model
            .transcription
            .filter(|_| self.model.transcribes_input(requested));
        let status = if backend.is_some() {
            ItemStatus::InProgress
        } else {
            ItemStatus::Completed
        };

        let item = ConversationItem::message(Role::User, status, vec![input_audio_part()]);
        let item_id = item.id.clone();
        let previous_item_id = self.conversation.lock().append(item.clone());

        debug!(item_id = %item_id, audio_bytes = audio.len(), "Committed input audio");

        self.events
            .send(ServerEvent::InputAudioBufferCommitted {
                previous_item_id: previous_item_id.clone(),
                item_id: item_id.clone(),
            })
            .await;
        self.events
            .send(ServerEvent::ConversationItemCreated {
                previous_item_id,
                item,
            })
            .await;

        if let Some(backend) = backend {
            self.spawn_transcription(item_id, audio, backend);
        }
        Ok(())
    }

    async fn create_response(self: &Arc<Self>, params: ResponseParams) -> EventResult<()> {
        if let Some(instructions) = &params.instructions
            && instructions.len() > MAX_INSTRUCTIONS_SIZE
        {
            return Err(EventError::TooLarge {
                field: "response.instructions",
                max: MAX_INSTRUCTIONS_SIZE,
            });
        }
        if let Some(format) = &params.output_audio_format
            && format != PCM16
        {
            return Err(EventError::InvalidEvent(format!(
                "output_audio_format `{format}` is not supported, use `{PCM16}`"
            )));
        }

        let (response_id, cancel) = {
            let mut active = self.active_response.lock();
            if let Some(current) = active.as_ref() {
                return Err(EventError::ResponseInProgress(current.id.clone()));
            }
            let response_id = new_id("resp");
            let cancel = self.shutdown.child_token();
            *active = Some(ActiveResponse {
                id: response_id.clone(),
                cancel: cancel.clone(),
            });
            (response_id, cancel)
        };

        info!(response_id = %response_id, model = self.model.name, "Response requested");

        self.events
            .send(ServerEvent::ResponseCreated {
                response: ResponseResource::in_progress(&response_id),
            })
            .await;

        self.spawn_response(response_id, params, cancel);
        Ok(())
    }

    fn cancel_response(&self, response_id: Option<String>) -> EventResult<()> {
        let active = self.active_response.lock();
        let Some(current) = active.as_ref() else {
            return Err(EventError::NoActiveResponse);
        };

        if let Some(requested) = response_id
            && requested != current.id
        {
            return Err(EventError::InvalidEvent(format!(
                "response {requested} is not in progress"
            )));
        }

        info!(response_id = %current.id, "Cancelling response");
        current.cancel.cancel();
        Ok(())
    }

    /// Drop the active-response slot if it still belongs to `response_id`.
    pub(super) fn clear_active_response(&self, response_id: &str) {
        let mut active = self.active_response.lock();
        if active.as_ref().is_some_and(|r| r.id == response_id) {
            *active = None;
        }
    }

    pub(super) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub(super) fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Stop accepting events, cancel background work, and wait briefly for it to stop.
    pub async fn close(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase == ConnectionPhase::Closed {
                return;
            }
            *phase = ConnectionPhase::Closed;
        }

        self.shutdown.cancel();
        self.tasks.close();

        if tokio::time::timeout(TASK_SHUTDOWN_GRACE, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                session_id = %self.session_id(),
                "Background tasks still running after {:?}", TASK_SHUTDOWN_GRACE
            );
        }
        debug!(session_id = %self.session_id(), "Realtime connection closed");
    }
}
