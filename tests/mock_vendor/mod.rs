//! Mock vendor task server
//!
//! Speaks the task protocol over a local WebSocket:
//! - `run-task` is answered with `task-started` (or `task-failed`, or nothing)
//! - every `continue-task` of a synthesis task produces one binary audio frame
//! - binary frames sent to a recognition task are counted
//! - `finish-task` produces the configured sentences (recognition) and `task-finished`

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// How the mock answers each task.
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Audio bytes returned for each `continue-task`
    pub audio_chunk: Vec<u8>,
    /// Sentences returned by recognition tasks; the last one is final
    pub sentences: Vec<String>,
    /// Answer `run-task` with `task-failed`
    pub fail_run: Option<(String, String)>,
    /// Never answer `run-task`
    pub never_start: bool,
    /// Delay before each audio frame
    pub audio_delay: Option<Duration>,
    /// Fail the task after the first `continue-task`
    pub fail_after_continue: bool,
    /// Audio frames sent ahead of `task-started`
    pub audio_before_start: usize,
    /// Send an undecodable text frame before `task-finished`
    pub garbage_before_finish: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            audio_chunk: vec![1, 2, 3, 4],
            sentences: vec!["hello".to_string(), "hello world".to_string()],
            fail_run: None,
            never_start: false,
            audio_delay: None,
            fail_after_continue: false,
            audio_before_start: 0,
            garbage_before_finish: false,
        }
    }
}

/// Everything the mock observed, shared with the test.
#[derive(Default)]
pub struct MockRecord {
    pub commands: Mutex<Vec<Value>>,
    pub authorization: Mutex<Vec<String>>,
    pub audio_bytes: AtomicUsize,
    pub connections: AtomicUsize,
}

impl MockRecord {
    pub fn actions(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| c["header"]["action"].as_str().map(str::to_string))
            .collect()
    }

    pub fn run_tasks(&self) -> Vec<Value> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c["header"]["action"] == "run-task")
            .cloned()
            .collect()
    }

    pub fn continue_texts(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c["header"]["action"] == "continue-task")
            .filter_map(|c| c["payload"]["input"]["text"].as_str().map(str::to_string))
            .collect()
    }
}

pub struct MockVendor {
    pub url: String,
    pub record: Arc<MockRecord>,
}

impl MockVendor {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let record = Arc::new(MockRecord::default());

        let accept_record = record.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let record = accept_record.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, behavior, record).await;
                });
            }
        });

        Self {
            url: format!("ws://{addr}/api-ws/v1/inference"),
            record,
        }
    }
}

fn event(name: &str, task_id: &str) -> Message {
    Message::Text(
        json!({
            "header": {"event": name, "task_id": task_id},
            "payload": {}
        })
        .to_string()
        .into(),
    )
}

async fn handle_connection(
    stream: TcpStream,
    behavior: MockBehavior,
    record: Arc<MockRecord>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_record = record.clone();
    let ws = accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(value) = req.headers().get("authorization")
            && let Ok(value) = value.to_str()
        {
            header_record.authorization.lock().push(value.to_string());
        }
        Ok(resp)
    })
    .await?;
    record.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();
    let mut task_id = String::new();
    let mut is_asr = false;

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let command: Value = serde_json::from_str(&text)?;
                record.commands.lock().push(command.clone());
                let action = command["header"]["action"].as_str().unwrap_or_default();

                match action {
                    "run-task" => {
                        task_id = command["header"]["task_id"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string();
                        is_asr = command["payload"]["task"] == "asr";

                        if let Some((code, message)) = &behavior.fail_run {
                            let failed = json!({
                                "header": {
                                    "event": "task-failed",
                                    "task_id": task_id,
                                    "error_code": code,
                                    "error_message": message,
                                },
                                "payload": {}
                            });
                            write.send(Message::Text(failed.to_string().into())).await?;
                            continue;
                        }
                        if behavior.never_start {
                            continue;
                        }
                        for _ in 0..behavior.audio_before_start {
                            write
                                .send(Message::Binary(behavior.audio_chunk.clone().into()))
                                .await?;
                        }
                        write.send(event("task-started", &task_id)).await?;
                    }
                    "continue-task" => {
                        if behavior.fail_after_continue {
                            let failed = json!({
                                "header": {
                                    "event": "task-failed",
                                    "task_id": task_id,
                                    "error_code": "InternalError",
                                    "error_message": "synthesis crashed",
                                },
                                "payload": {}
                            });
                            write.send(Message::Text(failed.to_string().into())).await?;
                            continue;
                        }
                        if let Some(delay) = behavior.audio_delay {
                            tokio::time::sleep(delay).await;
                        }
                        write
                            .send(Message::Binary(behavior.audio_chunk.clone().into()))
                            .await?;
                    }
                    "finish-task" => {
                        if is_asr {
                            let last = behavior.sentences.len().saturating_sub(1);
                            for (index, sentence) in behavior.sentences.iter().enumerate() {
                                let result = json!({
                                    "header": {"event": "result-generated", "task_id": task_id},
                                    "payload": {"output": {"sentence": {
                                        "text": sentence,
                                        "sentence_end": index == last,
                                    }}}
                                });
                                write.send(Message::Text(result.to_string().into())).await?;
                            }
                        }
                        if behavior.garbage_before_finish {
                            write.send(Message::Text("{not json".into())).await?;
                        }
                        write.send(event("task-finished", &task_id)).await?;
                    }
                    _ => {}
                }
            }
            Message::Binary(data) => {
                record.audio_bytes.fetch_add(data.len(), Ordering::SeqCst);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
