//! Per-session transcript reader.
//!
//! Tails the assistant's append-only JSONL transcript from end-of-file and
//! turns assistant turns into `assistant_message` events. Non-JSON lines
//! are silently ignored (transcripts interleave other records), repeats of
//! the same provider `requestId` are suppressed, and messages with no tool
//! use and only whitespace text are flagged as preambles so consumers can
//! hide them.

use crate::adapters::AgentAdapter;
use crate::tailer::{LineTailer, TailEvent, TailerOptions};
use cab_core::event::{ContentBlock, EventPayload};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// One assistant message surfaced from a transcript, addressed to the
/// owning bridge session.
#[derive(Debug, Clone)]
pub struct TranscriptUpdate {
    pub session_id: Uuid,
    pub payload: EventPayload,
}

/// Handle over a running reader task.
pub struct TranscriptReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TranscriptReaderHandle {
    /// Stop the reader and wait for it to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Stop without waiting (used when the caller cannot await).
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

/// A message is a preamble when nothing in it invokes a tool and every text
/// block trims to empty.
pub fn is_preamble(content: &[ContentBlock]) -> bool {
    content.iter().all(|block| match block {
        ContentBlock::ToolUse { .. } => false,
        ContentBlock::Text { text } => text.trim().is_empty(),
        ContentBlock::Thinking { .. } => true,
    })
}

/// Spawn a reader for one session's transcript.
///
/// The reader tails from end-of-file, so only turns written after the
/// session was linked are surfaced.
pub fn spawn_reader(
    session_id: Uuid,
    adapter: Arc<dyn AgentAdapter>,
    path: PathBuf,
    tx: mpsc::Sender<TranscriptUpdate>,
    parent_cancel: &CancellationToken,
) -> TranscriptReaderHandle {
    let cancel = parent_cancel.child_token();
    let run_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let (line_tx, mut line_rx) = mpsc::channel::<TailEvent>(64);
        let tailer = LineTailer::new(path.clone(), TailerOptions::default());
        let tail_cancel = run_cancel.clone();
        let tail_task = tokio::spawn(async move { tailer.run(line_tx, tail_cancel).await });

        let mut seen_requests: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = run_cancel.cancelled() => break,
                event = line_rx.recv() => {
                    let Some(event) = event else { break };
                    let TailEvent::Line(line) = event else { continue };
                    let Some(update) = parse_line(&line, adapter.as_ref(), &mut seen_requests) else {
                        continue;
                    };
                    let update = TranscriptUpdate {
                        session_id,
                        payload: update,
                    };
                    if tx.send(update).await.is_err() {
                        break;
                    }
                }
            }
        }

        run_cancel.cancel();
        let _ = tail_task.await;
        debug!("Transcript reader for session {session_id} stopped");
    });

    TranscriptReaderHandle { cancel, task }
}

/// Parse one transcript line into an assistant-message payload, applying
/// the request-id dedup set.
fn parse_line(
    line: &str,
    adapter: &dyn AgentAdapter,
    seen_requests: &mut HashSet<String>,
) -> Option<EventPayload> {
    // Transcripts interleave non-JSON content; those lines are not ours.
    let entry: Value = serde_json::from_str(line).ok()?;
    if entry.get("type").and_then(Value::as_str) != Some("assistant") {
        return None;
    }
    let message = adapter.parse_transcript_entry(&entry)?;

    if let Some(request_id) = &message.request_id {
        if !seen_requests.insert(request_id.clone()) {
            return None;
        }
    }

    let preamble = is_preamble(&message.content);
    Some(EventPayload::AssistantMessage {
        content: message.content,
        request_id: message.request_id,
        is_preamble: preamble,
    })
}
