//! HTTP + WebSocket front end.
//!
//! One axum server: REST for CRUD/control, a WebSocket upgrade on the root
//! path for broadcasts, and the `/event` intake that feeds raw hook POSTs
//! through the same decoder pipeline as the event-log tailer.

pub mod rest;
pub mod ws;

use crate::hooks::HookDecoder;
use crate::supervisor::{BridgeSignal, SessionSupervisor};
use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cab_core::event::AgentEvent;
use cab_core::BridgeConfig;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// JSON bodies above this are rejected outright.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Events kept in memory for `get_history`. Not persisted — the buffer
/// dies with the process.
pub const HISTORY_CAPACITY: usize = 500;

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<SessionSupervisor>,
    pub decoder: Arc<HookDecoder>,
    pub config: Arc<BridgeConfig>,
    pub clients: Arc<AtomicUsize>,
    pub history: Arc<Mutex<VecDeque<AgentEvent>>>,
}

/// Build the router. Separated from [`serve`] for tests.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/health", get(rest::health))
        .route(
            "/sessions",
            get(rest::list_sessions).post(rest::create_session),
        )
        .route(
            "/sessions/{id}",
            get(rest::get_session)
                .patch(rest::update_session)
                .delete(rest::delete_session),
        )
        .route("/sessions/{id}/prompt", axum::routing::post(rest::send_prompt))
        .route("/sessions/{id}/cancel", axum::routing::post(rest::cancel_session))
        .route(
            "/sessions/{id}/restart",
            axum::routing::post(rest::restart_session),
        )
        .route("/event", axum::routing::post(rest::post_event))
        .fallback(rest::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}

/// Run the server until cancellation.
pub async fn serve(
    config: BridgeConfig,
    supervisor: Arc<SessionSupervisor>,
    decoder: Arc<HookDecoder>,
    cancel: CancellationToken,
) -> Result<()> {
    let state = ApiState {
        supervisor: Arc::clone(&supervisor),
        decoder,
        config: Arc::new(config),
        clients: Arc::new(AtomicUsize::new(0)),
        history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY))),
    };

    // Record broadcast events into the bounded history ring.
    let history = Arc::clone(&state.history);
    let mut signals = supervisor.subscribe();
    let history_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = history_cancel.cancelled() => break,
                signal = signals.recv() => {
                    match signal {
                        Ok(BridgeSignal::Event(event)) => {
                            let mut ring = history.lock().unwrap();
                            if ring.len() == HISTORY_CAPACITY {
                                ring.pop_front();
                            }
                            ring.push_back(event);
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Bridge API listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("HTTP server error")
}

/// Mirror the `Origin` header when it matches a configured glob, and
/// answer every preflight with 204.
async fn cors(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    if let Some(origin) = origin {
        let allowed = origin
            .to_str()
            .is_ok_and(|o| state.config.origin_allowed(o));
        if allowed {
            let headers = response.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("content-type"),
            );
        }
    }
    response
}
