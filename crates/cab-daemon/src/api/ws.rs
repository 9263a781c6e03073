//! WebSocket lifecycle and broadcast fan-out.
//!
//! Every client gets the current session list on connect, then a stream of
//! `event` and `session:*` envelopes. Clients may narrow the `event` stream
//! with a `subscribe` filter; `session:*` broadcasts are never filtered.
//! Unlisted origins are cut off with close code 4003.

use super::ApiState;
use crate::supervisor::{BridgeSignal, ListFilter};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderMap;
use axum::response::Response;
use cab_core::event::AgentEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Close code for origin rejection.
const CLOSE_FORBIDDEN_ORIGIN: u16 = 4003;

/// Per-client narrowing of the `event` stream.
#[derive(Debug, Default)]
struct Subscription {
    sessions: Option<HashSet<Uuid>>,
    event_types: Option<HashSet<String>>,
}

impl Subscription {
    fn allows(&self, event: &AgentEvent) -> bool {
        if let Some(sessions) = &self.sessions {
            match event.session_id {
                Some(id) if sessions.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(event.payload.kind()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    #[serde(rename_all = "camelCase")]
    GetHistory {
        limit: Option<usize>,
        session_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        sessions: Option<Vec<Uuid>>,
        event_types: Option<Vec<String>>,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Response {
    let origin_ok = match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(origin) => state.config.origin_allowed(origin),
        // No origin (non-browser client) is always allowed.
        None => true,
    };

    ws.on_upgrade(move |socket| async move {
        if origin_ok {
            handle_socket(socket, state).await;
        } else {
            reject_socket(socket).await;
        }
    })
}

async fn reject_socket(mut socket: WebSocket) {
    debug!("Rejecting WebSocket from unlisted origin");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_FORBIDDEN_ORIGIN,
            reason: "origin not allowed".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    state.clients.fetch_add(1, Ordering::Relaxed);
    debug!("WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(128);
    let subscription = Arc::new(Mutex::new(Subscription::default()));

    // Writer task: everything leaving this client funnels through one
    // channel so the init snapshot, replies, and broadcasts interleave
    // cleanly.
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // Current session list first.
    let init = json!({
        "type": "init",
        "data": { "sessions": state.supervisor.list(&ListFilter::default()) },
    });
    let _ = outbound_tx.send(text_message(&init)).await;

    // Broadcast forwarder.
    let mut signals = state.supervisor.subscribe();
    let forward_tx = outbound_tx.clone();
    let forward_subscription = Arc::clone(&subscription);
    let forward_task = tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(signal) => {
                    let Some(envelope) = envelope_for(&signal, &forward_subscription) else {
                        continue;
                    };
                    if forward_tx.send(text_message(&envelope)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("WebSocket client lagged, dropped {missed} broadcast(s)");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Reader loop.
    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(Message::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error: {e}");
                break;
            }
        };

        let message: ClientMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unparseable client message: {e}");
                continue;
            }
        };
        handle_client_message(message, &state, &subscription, &outbound_tx).await;
    }

    forward_task.abort();
    send_task.abort();
    state.clients.fetch_sub(1, Ordering::Relaxed);
    debug!("WebSocket client disconnected");
}

async fn handle_client_message(
    message: ClientMessage,
    state: &ApiState,
    subscription: &Arc<Mutex<Subscription>>,
    outbound_tx: &mpsc::Sender<Message>,
) {
    match message {
        ClientMessage::Ping => {
            let _ = outbound_tx.send(text_message(&json!({ "type": "pong" }))).await;
        }
        ClientMessage::GetHistory { limit, session_id } => {
            let events: Vec<AgentEvent> = {
                let ring = state.history.lock().unwrap();
                ring.iter()
                    .filter(|e| session_id.is_none_or(|id| e.session_id == Some(id)))
                    .cloned()
                    .collect()
            };
            let limit = limit.unwrap_or(events.len());
            let start = events.len().saturating_sub(limit);
            let reply = json!({ "type": "history", "data": { "events": &events[start..] } });
            let _ = outbound_tx.send(text_message(&reply)).await;
        }
        ClientMessage::Subscribe {
            sessions,
            event_types,
        } => {
            let mut guard = subscription.lock().unwrap();
            guard.sessions = sessions.map(|s| s.into_iter().collect());
            guard.event_types = event_types.map(|t| t.into_iter().collect());
            debug!("WebSocket subscription updated: {guard:?}");
        }
    }
}

fn text_message(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Map a supervisor signal to its wire envelope, applying the client's
/// event filter. `None` means this client skips the signal.
fn envelope_for(signal: &BridgeSignal, subscription: &Arc<Mutex<Subscription>>) -> Option<Value> {
    match signal {
        BridgeSignal::Event(event) => {
            if !subscription.lock().unwrap().allows(event) {
                return None;
            }
            Some(json!({ "type": "event", "data": event }))
        }
        BridgeSignal::Raw(payload) => Some(json!({ "type": "event", "data": payload })),
        BridgeSignal::SessionCreated(session) => {
            Some(json!({ "type": "session:created", "data": session }))
        }
        BridgeSignal::SessionUpdated(session) => {
            Some(json!({ "type": "session:updated", "data": session }))
        }
        BridgeSignal::SessionDeleted(session) => {
            Some(json!({ "type": "session:deleted", "data": session }))
        }
        BridgeSignal::SessionStatus { session, .. } => {
            Some(json!({ "type": "session:status", "data": session }))
        }
        // Operator-facing; not part of the client protocol.
        BridgeSignal::Error(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cab_core::event::EventPayload;

    fn event_for(session_id: Option<Uuid>, payload: EventPayload) -> AgentEvent {
        let mut event = AgentEvent::new("claude", payload);
        event.session_id = session_id;
        event
    }

    #[test]
    fn test_default_subscription_allows_everything() {
        let subscription = Subscription::default();
        let event = event_for(Some(Uuid::new_v4()), EventPayload::SessionEnd);
        assert!(subscription.allows(&event));
        let unrouted = event_for(None, EventPayload::SessionEnd);
        assert!(subscription.allows(&unrouted));
    }

    #[test]
    fn test_session_filter() {
        let id = Uuid::new_v4();
        let subscription = Subscription {
            sessions: Some([id].into_iter().collect()),
            event_types: None,
        };
        assert!(subscription.allows(&event_for(Some(id), EventPayload::SessionEnd)));
        assert!(!subscription.allows(&event_for(Some(Uuid::new_v4()), EventPayload::SessionEnd)));
        assert!(!subscription.allows(&event_for(None, EventPayload::SessionEnd)));
    }

    #[test]
    fn test_event_type_filter() {
        let subscription = Subscription {
            sessions: None,
            event_types: Some(["stop".to_string()].into_iter().collect()),
        };
        assert!(subscription.allows(&event_for(
            None,
            EventPayload::Stop {
                stop_hook_active: false,
                response: None
            }
        )));
        assert!(!subscription.allows(&event_for(None, EventPayload::SessionEnd)));
    }

    #[test]
    fn test_client_message_wire_format() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));

        let history: ClientMessage =
            serde_json::from_str(r#"{"type":"get_history","limit":10}"#).unwrap();
        assert!(matches!(
            history,
            ClientMessage::GetHistory {
                limit: Some(10),
                session_id: None
            }
        ));

        let subscribe: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","eventTypes":["stop"]}"#).unwrap();
        match subscribe {
            ClientMessage::Subscribe { event_types, .. } => {
                assert_eq!(event_types.unwrap(), vec!["stop".to_string()]);
            }
            other => panic!("wrong message: {other:?}"),
        }
    }
}
