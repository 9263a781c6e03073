//! REST handlers.
//!
//! Every failure body is `{"error": <message>}`; status codes come from the
//! error taxonomy (validation and conflicts are 400, missing resources 404).
//! A bad request never disturbs the server.

use super::ApiState;
use crate::supervisor::{CreateOptions, ListFilter};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cab_core::error::BridgeError;
use cab_core::session::{SessionKind, SessionStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::debug;
use uuid::Uuid;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn bridge_error(err: BridgeError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, err.to_string())
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id)
        .map_err(|_| error_response(StatusCode::NOT_FOUND, format!("session {id} not found")))
}

pub async fn health(State(state): State<ApiState>) -> Response {
    Json(json!({
        "status": "ok",
        "clients": state.clients.load(Ordering::Relaxed),
        "sessions": state.supervisor.session_count(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    agent: Option<String>,
    status: Option<String>,
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = ListFilter {
        kind: query.kind.as_deref().and_then(|k| match k {
            "internal" => Some(SessionKind::Internal),
            "external" => Some(SessionKind::External),
            _ => None,
        }),
        agent: query.agent,
        status: query.status.as_deref().and_then(SessionStatus::parse),
    };
    Json(state.supervisor.list(&filter)).into_response()
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    name: Option<String>,
    cwd: Option<PathBuf>,
    agent: Option<String>,
    #[serde(default)]
    flags: BTreeMap<String, String>,
    #[serde(default)]
    spawn_terminal: bool,
}

pub async fn create_session(
    State(state): State<ApiState>,
    body: Result<Json<CreateBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    let options = CreateOptions {
        name: body.name,
        cwd: body.cwd,
        agent: body.agent,
        flags: body.flags,
        spawn_terminal: body.spawn_terminal,
    };
    match state.supervisor.create(options).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => bridge_error(e),
    }
}

pub async fn get_session(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.supervisor.get(id) {
        Some(session) => Json(session).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("session {id} not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    name: Option<String>,
}

pub async fn update_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.supervisor.update(id, body.name) {
        Ok(session) => Json(session).into_response(),
        Err(e) => bridge_error(e),
    }
}

pub async fn delete_session(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.supervisor.delete(id).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => bridge_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    prompt: Option<String>,
}

pub async fn send_prompt(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<PromptBody>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let prompt = match body {
        Ok(Json(PromptBody {
            prompt: Some(prompt),
        })) if !prompt.is_empty() => prompt,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Missing prompt"),
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.supervisor.send_prompt(id, &prompt).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => bridge_error(e),
    }
}

pub async fn cancel_session(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.supervisor.cancel_session(id).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => bridge_error(e),
    }
}

pub async fn restart_session(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.supervisor.restart(id).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => bridge_error(e),
    }
}

/// Hook intake over HTTP: the same pipeline as the event-log tailer.
pub async fn post_event(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(payload) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state.decoder.decode(&payload) {
        Some(processed) => state.supervisor.ingest(processed).await,
        None => {
            // Nothing claimed it; rebroadcast best-effort so dashboards
            // still see the traffic.
            debug!("Rebroadcasting unclaimed hook payload");
            state.supervisor.broadcast_raw(payload);
        }
    }
    Json(json!({ "success": true })).into_response()
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}
