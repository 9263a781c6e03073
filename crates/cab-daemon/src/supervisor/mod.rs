//! The session supervisor — the bridge's core state machine.
//!
//! Single-writer by construction: all session state lives behind one
//! mutex that is never held across an await point. Async work (tmux
//! subprocesses, snapshot writes) happens outside the lock and the results
//! are folded back in. The three producers — the hook pipeline, the
//! transcript readers, and the API handlers — all funnel through the
//! methods here, so any observer sees a consistent
//! `(status, currentTool, lastActivity)` triple.
//!
//! Outbound edges are one tagged [`BridgeSignal`] over a broadcast channel;
//! the API front end fans it out to WebSocket clients.

pub mod health;
pub mod persistence;

use crate::adapters::{AdapterRegistry, AgentAdapter as _};
use crate::spawn;
use crate::tmux::{CreateSessionOptions, TargetOptions, TmuxControl};
use crate::transcript::{self, TranscriptReaderHandle, TranscriptUpdate};
use cab_core::error::{BridgeError, Result};
use cab_core::event::{now_ms, AgentEvent, EventPayload, ProcessedEvent};
use cab_core::session::{Session, SessionKind, SessionStatus, TerminalInfo};
use cab_core::snapshot::BridgeSnapshot;
use cab_core::BridgeConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the supervisor tells the outside world.
#[derive(Debug, Clone)]
pub enum BridgeSignal {
    SessionCreated(Session),
    SessionUpdated(Session),
    SessionDeleted(Session),
    SessionStatus {
        session: Session,
        old: SessionStatus,
        new: SessionStatus,
    },
    /// A processed agent event, with the bridge session id injected.
    Event(AgentEvent),
    /// A payload no decoder claimed, rebroadcast best-effort.
    Raw(serde_json::Value),
    /// A failure the server survives but the operator should see.
    Error(String),
}

/// Options for [`SessionSupervisor::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Adapter name; defaults to `claude`.
    pub agent: Option<String>,
    pub flags: std::collections::BTreeMap<String, String>,
    /// Fire-and-forget a visible terminal attached to the tmux session.
    pub spawn_terminal: bool,
}

/// Filter for [`SessionSupervisor::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<SessionKind>,
    pub agent: Option<String>,
    pub status: Option<SessionStatus>,
}

struct Inner {
    by_id: HashMap<Uuid, Session>,
    /// `agentSessionId -> sessionId`; rebuilt from `by_id` on load.
    by_agent_id: HashMap<String, Uuid>,
    session_counter: u64,
    dirty: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_agent_id: HashMap::new(),
            session_counter: 0,
            dirty: false,
        }
    }

    fn snapshot(&self) -> BridgeSnapshot {
        let mut sessions: Vec<Session> = self.by_id.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        let mut map: Vec<(String, Uuid)> = self
            .by_agent_id
            .iter()
            .map(|(a, s)| (a.clone(), *s))
            .collect();
        map.sort();
        BridgeSnapshot {
            sessions,
            agent_to_managed_map: map,
            session_counter: self.session_counter,
        }
    }
}

pub struct SessionSupervisor {
    config: BridgeConfig,
    tmux: Arc<dyn TmuxControl>,
    adapters: Arc<AdapterRegistry>,
    inner: Mutex<Inner>,
    signals: broadcast::Sender<BridgeSignal>,
    readers: Mutex<HashMap<Uuid, TranscriptReaderHandle>>,
    transcript_tx: mpsc::Sender<TranscriptUpdate>,
    transcript_rx: Mutex<Option<mpsc::Receiver<TranscriptUpdate>>>,
    /// Root token for health loops and readers; `stop()` fires it.
    cancel: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl SessionSupervisor {
    pub fn new(
        config: BridgeConfig,
        tmux: Arc<dyn TmuxControl>,
        adapters: Arc<AdapterRegistry>,
    ) -> Arc<Self> {
        let (signals, _) = broadcast::channel(512);
        let (transcript_tx, transcript_rx) = mpsc::channel(256);
        Arc::new(Self {
            config,
            tmux,
            adapters,
            inner: Mutex::new(Inner::new()),
            signals,
            readers: Mutex::new(HashMap::new()),
            transcript_tx,
            transcript_rx: Mutex::new(Some(transcript_rx)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to the supervisor's outbound signals.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeSignal> {
        self.signals.subscribe()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn emit(&self, signal: BridgeSignal) {
        // No receivers is fine — nobody connected yet.
        let _ = self.signals.send(signal);
    }

    /// Broadcast a payload no decoder claimed (the `/event` best-effort path).
    pub fn broadcast_raw(&self, value: serde_json::Value) {
        self.emit(BridgeSignal::Raw(value));
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Load the persisted snapshot. Internal sessions come back `offline`
    /// with no terminal: tmux state does not survive a bridge restart.
    pub fn load(&self) -> Result<()> {
        let Some(snapshot) = persistence::load_snapshot(&self.config.sessions_path())? else {
            return Ok(());
        };
        let mut inner = self.inner.lock().unwrap();
        inner.by_id.clear();
        inner.by_agent_id.clear();
        for mut session in snapshot.sessions {
            if session.kind == SessionKind::Internal {
                session.status = SessionStatus::Offline;
                session.terminal = None;
                session.current_tool = None;
            }
            inner.by_id.insert(session.id, session);
        }
        for (agent_session_id, session_id) in snapshot.agent_to_managed_map {
            if inner.by_id.contains_key(&session_id) {
                inner.by_agent_id.insert(agent_session_id, session_id);
            }
        }
        inner.session_counter = snapshot.session_counter;
        inner.dirty = false;
        info!("Loaded {} session(s) from disk", inner.by_id.len());
        Ok(())
    }

    /// Start health loops and the transcript consumer.
    pub fn start(self: &Arc<Self>, external_cancel: CancellationToken) {
        // Forward external cancellation into our root token.
        let root = self.cancel.clone();
        tokio::spawn(async move {
            external_cancel.cancelled().await;
            root.cancel();
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.extend(health::spawn_loops(Arc::clone(self), self.cancel.clone()));

        if let Some(mut rx) = self.transcript_rx.lock().unwrap().take() {
            let supervisor = Arc::clone(self);
            let cancel = self.cancel.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        update = rx.recv() => {
                            let Some(update) = update else { break };
                            supervisor.handle_transcript_update(update);
                        }
                    }
                }
            }));
        }
    }

    /// Stop loops, stop every transcript reader (awaiting completion), and
    /// force a final save.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }

        let readers: Vec<_> = {
            let mut map = self.readers.lock().unwrap();
            map.drain().map(|(_, handle)| handle).collect()
        };
        for reader in readers {
            reader.stop().await;
        }

        if let Err(e) = self.force_save() {
            warn!("Final save failed: {e}");
        }
    }

    // ── persistence ───────────────────────────────────────────────────────

    /// Write-behind save: a no-op while clean.
    pub fn save(&self) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            inner.snapshot()
        };
        self.write_snapshot(snapshot)
    }

    /// Save regardless of the dirty flag.
    pub fn force_save(&self) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.dirty = false;
            inner.snapshot()
        };
        self.write_snapshot(snapshot)
    }

    fn write_snapshot(&self, snapshot: BridgeSnapshot) -> Result<()> {
        match persistence::save_snapshot(&self.config.sessions_path(), &snapshot) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Keep running on memory; re-mark dirty so the flush loop
                // retries.
                self.inner.lock().unwrap().dirty = true;
                self.emit(BridgeSignal::Error(format!("session save failed: {e}")));
                Err(e)
            }
        }
    }

    // ── CRUD ──────────────────────────────────────────────────────────────

    /// Create an internal session: spawn the assistant inside a fresh
    /// bridge-owned tmux session.
    pub async fn create(&self, opts: CreateOptions) -> Result<Session> {
        let agent_name = opts.agent.as_deref().unwrap_or("claude");
        let adapter = self
            .adapters
            .get(agent_name)
            .ok_or_else(|| BridgeError::NoAdapter(agent_name.to_string()))?;

        let id = Uuid::new_v4();
        let tmux_session = format!("cab-{}", &id.to_string()[..8]);
        let cwd = resolve_cwd(opts.cwd.as_deref());
        let command = adapter.build_command(&opts.flags)?;

        self.tmux
            .create_session(
                &tmux_session,
                &CreateSessionOptions {
                    cwd: Some(cwd.clone()),
                    command: Some(command),
                    width: None,
                    height: None,
                },
            )
            .await?;

        if opts.spawn_terminal {
            // Purely cosmetic; a failure here never fails creation.
            spawn::spawn_terminal(&tmux_session);
        }

        let now = now_ms();
        let session = {
            let mut inner = self.inner.lock().unwrap();
            let name = opts
                .name
                .filter(|n| !n.trim().is_empty())
                .or_else(|| basename(&cwd))
                .unwrap_or_else(|| {
                    inner.session_counter += 1;
                    format!("session-{}", inner.session_counter)
                });
            let session = Session {
                id,
                name,
                kind: SessionKind::Internal,
                agent: agent_name.to_string(),
                status: SessionStatus::Working,
                cwd,
                created_at: now,
                last_activity: now,
                tmux_session: Some(tmux_session),
                agent_session_id: None,
                current_tool: None,
                terminal: None,
                transcript_path: None,
            };
            inner.by_id.insert(id, session.clone());
            inner.dirty = true;
            session
        };

        info!(
            "Created internal {} session {} in {}",
            session.agent,
            session.id,
            session.cwd.display()
        );
        self.emit(BridgeSignal::SessionCreated(session.clone()));
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.lock().unwrap().by_id.get(&id).cloned()
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<Session> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<Session> = inner
            .by_id
            .values()
            .filter(|s| filter.kind.is_none_or(|k| s.kind == k))
            .filter(|s| filter.agent.as_deref().is_none_or(|a| s.agent == a))
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().by_id.len()
    }

    /// Rename a session.
    pub fn update(&self, id: Uuid, name: Option<String>) -> Result<Session> {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            let session = inner
                .by_id
                .get_mut(&id)
                .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;
            if let Some(name) = name {
                session.name = name;
            }
            let session = session.clone();
            inner.dirty = true;
            session
        };
        self.emit(BridgeSignal::SessionUpdated(session.clone()));
        Ok(session)
    }

    /// Delete a session: stop its reader, drop its maps entry, kill its
    /// tmux session when internal.
    pub async fn delete(&self, id: Uuid) -> Result<Session> {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            let session = inner
                .by_id
                .remove(&id)
                .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;
            inner.by_agent_id.retain(|_, sid| *sid != id);
            inner.dirty = true;
            session
        };

        let reader = self.readers.lock().unwrap().remove(&id);
        if let Some(reader) = reader {
            reader.stop().await;
        }

        if session.kind == SessionKind::Internal {
            if let Some(tmux_session) = &session.tmux_session {
                let _ = self.tmux.kill_session(tmux_session).await;
            }
        }

        info!("Deleted session {id}");
        self.emit(BridgeSignal::SessionDeleted(session.clone()));
        Ok(session)
    }

    // ── control ───────────────────────────────────────────────────────────

    /// Paste a prompt into the session's terminal and submit it.
    pub async fn send_prompt(&self, id: Uuid, text: &str) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;

        match session.kind {
            SessionKind::External => {
                let terminal = session.terminal.as_ref().ok_or(BridgeError::NoTerminal)?;
                let (Some(pane_id), Some(socket)) = (&terminal.pane_id, &terminal.socket) else {
                    return Err(BridgeError::NoTerminal);
                };
                self.tmux
                    .paste_buffer(
                        pane_id,
                        text,
                        true,
                        &TargetOptions {
                            is_pane_id: true,
                            socket: Some(socket.clone()),
                        },
                    )
                    .await?;
            }
            SessionKind::Internal => {
                if session.status == SessionStatus::Offline {
                    return Err(BridgeError::SessionOffline);
                }
                let tmux_session = session.tmux_session.as_ref().ok_or(BridgeError::NoTerminal)?;
                self.tmux
                    .paste_buffer(tmux_session, text, true, &TargetOptions::default())
                    .await?;
                self.apply_status(id, SessionStatus::Working);
            }
        }
        Ok(())
    }

    /// Interrupt (Ctrl-C) an internal session.
    pub async fn cancel_session(&self, id: Uuid) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;
        if session.kind != SessionKind::Internal {
            return Err(BridgeError::NotSupported(
                "cancel is only supported for internal sessions".to_string(),
            ));
        }
        let tmux_session = session.tmux_session.as_ref().ok_or(BridgeError::NoTerminal)?;
        self.tmux.send_interrupt(tmux_session).await
    }

    /// Restart an offline internal session under a fresh tmux name.
    ///
    /// The agent session identity is cleared: the restarted process will
    /// report a new one and re-link through the normal window.
    pub async fn restart(&self, id: Uuid) -> Result<Session> {
        let session = self
            .get(id)
            .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;
        if session.kind != SessionKind::Internal {
            return Err(BridgeError::NotSupported(
                "restart is only supported for internal sessions".to_string(),
            ));
        }
        if session.status != SessionStatus::Offline {
            return Err(BridgeError::NotSupported(
                "restart requires an offline session".to_string(),
            ));
        }

        let adapter = self
            .adapters
            .get(&session.agent)
            .ok_or_else(|| BridgeError::NoAdapter(session.agent.clone()))?;

        // A lingering tmux session under the old name would collide.
        if let Some(old_name) = &session.tmux_session {
            let _ = self.tmux.kill_session(old_name).await;
        }

        // Monotonic suffix guarantees the new name differs from every
        // previous incarnation.
        let seq = {
            let mut inner = self.inner.lock().unwrap();
            inner.session_counter += 1;
            inner.session_counter
        };
        let tmux_session = format!("cab-{}-{seq}", &id.to_string()[..8]);
        let command = adapter.build_command(&std::collections::BTreeMap::new())?;

        self.tmux
            .create_session(
                &tmux_session,
                &CreateSessionOptions {
                    cwd: Some(session.cwd.clone()),
                    command: Some(command),
                    width: None,
                    height: None,
                },
            )
            .await?;

        let updated = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(agent_session_id) = &session.agent_session_id {
                inner.by_agent_id.remove(agent_session_id);
            }
            let entry = inner
                .by_id
                .get_mut(&id)
                .ok_or_else(|| BridgeError::NotFound(format!("session {id}")))?;
            entry.tmux_session = Some(tmux_session);
            entry.agent_session_id = None;
            entry.status = SessionStatus::Working;
            entry.current_tool = None;
            entry.terminal = None;
            entry.touch(now_ms());
            let updated = entry.clone();
            inner.dirty = true;
            updated
        };

        info!("Restarted session {id} as {:?}", updated.tmux_session);
        self.emit(BridgeSignal::SessionUpdated(updated.clone()));
        Ok(updated)
    }

    // ── the hook pipeline ─────────────────────────────────────────────────

    /// Fold one decoded hook event into the session model and broadcast it.
    pub async fn ingest(&self, processed: ProcessedEvent) {
        let session = self.find_or_create(
            &processed.agent_session_id,
            &processed.agent,
            processed.cwd.as_deref(),
            processed.terminal,
            processed.transcript_path,
        );

        let mut event = processed.event;
        event.session_id = Some(session.id);
        self.apply_event(&event);
        self.emit(BridgeSignal::Event(event));
    }

    /// Resolve an agent session identity to a bridge session, linking or
    /// creating as needed. The central invariant-preserving routine.
    pub fn find_or_create(
        &self,
        agent_session_id: &str,
        agent: &str,
        cwd: Option<&Path>,
        terminal: Option<TerminalInfo>,
        transcript_path: Option<PathBuf>,
    ) -> Session {
        let canonical_cwd = cwd.map(canonicalize_lossy);
        let now = now_ms();
        // Reader starts happen after the lock is released.
        let mut reader_to_start: Option<(Uuid, String, PathBuf)> = None;
        let mut created: Option<Session> = None;
        let mut linked: Option<Session> = None;

        let session = {
            let mut inner = self.inner.lock().unwrap();

            // Already linked?
            if let Some(&sid) = inner.by_agent_id.get(agent_session_id) {
                if let Some(session) = inner.by_id.get_mut(&sid) {
                    if let Some(terminal) = terminal.clone() {
                        session.terminal = Some(terminal);
                    }
                    if session.transcript_path.is_none() {
                        if let Some(path) = transcript_path.clone() {
                            session.transcript_path = Some(path.clone());
                            reader_to_start = Some((sid, session.agent.clone(), path));
                        }
                    }
                    let session = session.clone();
                    inner.dirty = true;
                    drop(inner);
                    if let Some((sid, agent, path)) = reader_to_start {
                        self.start_reader(sid, &agent, path);
                    }
                    return session;
                }
                // Dangling mapping; drop it and fall through.
                inner.by_agent_id.remove(agent_session_id);
            }

            // Adoptable internal candidate: same agent, same canonical cwd,
            // unlinked, created within the linking window. Never adopt
            // across agents — a codex hook must not hijack a claude session.
            let window = self.config.linking_window_ms;
            let candidate = inner.by_id.values_mut().find(|s| {
                s.kind == SessionKind::Internal
                    && s.agent_session_id.is_none()
                    && s.agent == agent
                    && canonical_cwd.as_deref().is_some_and(|c| s.cwd == c)
                    && now - s.created_at <= window
            });

            if let Some(session) = candidate {
                session.agent_session_id = Some(agent_session_id.to_string());
                if let Some(terminal) = terminal.clone() {
                    session.terminal = Some(terminal);
                }
                if session.transcript_path.is_none() {
                    if let Some(path) = transcript_path.clone() {
                        session.transcript_path = Some(path.clone());
                        reader_to_start = Some((session.id, session.agent.clone(), path));
                    }
                }
                session.touch(now);
                let session = session.clone();
                inner
                    .by_agent_id
                    .insert(agent_session_id.to_string(), session.id);
                inner.dirty = true;
                debug!(
                    "Linked agent session '{agent_session_id}' to internal session {}",
                    session.id
                );
                linked = Some(session.clone());
                session
            } else {
                // No candidate: a session we did not spawn.
                let id = Uuid::new_v4();
                let cwd = canonical_cwd.unwrap_or_else(|| PathBuf::from("/"));
                let session = Session {
                    id,
                    name: basename(&cwd).unwrap_or_else(|| agent.to_string()),
                    kind: SessionKind::External,
                    agent: agent.to_string(),
                    status: SessionStatus::Idle,
                    cwd,
                    created_at: now,
                    last_activity: now,
                    tmux_session: None,
                    agent_session_id: Some(agent_session_id.to_string()),
                    current_tool: None,
                    terminal,
                    transcript_path: transcript_path.clone(),
                };
                if self.config.track_external {
                    if let Some(path) = transcript_path {
                        reader_to_start = Some((id, agent.to_string(), path));
                    }
                    inner.by_id.insert(id, session.clone());
                    inner
                        .by_agent_id
                        .insert(agent_session_id.to_string(), id);
                    inner.dirty = true;
                    created = Some(session.clone());
                } else {
                    // Ephemeral: flows through the pipeline but is never
                    // inserted, persisted, or announced.
                    debug!(
                        "External tracking disabled; agent session '{agent_session_id}' stays ephemeral"
                    );
                }
                session
            }
        };

        if let Some((sid, agent, path)) = reader_to_start {
            self.start_reader(sid, &agent, path);
        }
        if let Some(session) = linked {
            self.emit(BridgeSignal::SessionUpdated(session));
        }
        if let Some(session) = created {
            info!(
                "Discovered external {} session {} ({agent_session_id})",
                session.agent, session.id
            );
            self.emit(BridgeSignal::SessionCreated(session));
        }

        session
    }

    /// Apply one event's status semantics to its session.
    fn apply_event(&self, event: &AgentEvent) {
        let Some(id) = event.session_id else { return };
        match &event.payload {
            EventPayload::SessionStart { .. } | EventPayload::UserPromptSubmit { .. } => {
                self.apply_status(id, SessionStatus::Working);
            }
            EventPayload::PreToolUse { tool, .. } => {
                self.apply_status(id, SessionStatus::Working);
                self.apply_tool(id, Some(tool.clone()));
            }
            EventPayload::PostToolUse { .. } => {
                // Stays working; the tool just finished.
                self.apply_tool(id, None);
                self.touch(id);
            }
            EventPayload::Stop { .. } | EventPayload::SubagentStop => {
                self.apply_status(id, SessionStatus::Idle);
            }
            EventPayload::SessionEnd => {
                self.apply_status(id, SessionStatus::Offline);
            }
            EventPayload::Notification { .. } | EventPayload::AssistantMessage { .. } => {
                self.touch(id);
            }
        }
    }

    /// Transition a session's status. Same-status applications only bump
    /// the activity clock; real transitions clear `currentTool` when
    /// leaving `working` and broadcast old → new.
    pub fn apply_status(&self, id: Uuid, new: SessionStatus) {
        let transition = {
            let mut inner = self.inner.lock().unwrap();
            let Some(session) = inner.by_id.get_mut(&id) else {
                return;
            };
            let old = session.status;
            session.touch(now_ms());
            if old == new {
                inner.dirty = true;
                None
            } else {
                session.status = new;
                if new != SessionStatus::Working {
                    session.current_tool = None;
                }
                let session = session.clone();
                inner.dirty = true;
                debug!("Session {id}: {old} -> {new}");
                Some((session, old))
            }
        };
        if let Some((session, old)) = transition {
            self.emit(BridgeSignal::SessionStatus { session, old, new });
        }
    }

    /// Set or clear the currently-executing tool.
    pub fn apply_tool(&self, id: Uuid, tool: Option<String>) {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.by_id.get_mut(&id) else {
            return;
        };
        // Invariant: a tool is only ever recorded on a working session.
        if tool.is_some() && session.status != SessionStatus::Working {
            return;
        }
        session.current_tool = tool;
        inner.dirty = true;
    }

    fn touch(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.by_id.get_mut(&id) {
            session.touch(now_ms());
            inner.dirty = true;
        }
    }

    // ── transcripts ───────────────────────────────────────────────────────

    fn start_reader(&self, session_id: Uuid, agent: &str, path: PathBuf) {
        let Some(adapter) = self.adapters.get(agent) else {
            return;
        };
        let handle = transcript::spawn_reader(
            session_id,
            adapter,
            path,
            self.transcript_tx.clone(),
            &self.cancel,
        );
        let mut readers = self.readers.lock().unwrap();
        if let Some(previous) = readers.insert(session_id, handle) {
            previous.abort();
        }
        debug!("Started transcript reader for session {session_id}");
    }

    fn handle_transcript_update(&self, update: TranscriptUpdate) {
        let (agent, agent_session_id) = {
            let inner = self.inner.lock().unwrap();
            match inner.by_id.get(&update.session_id) {
                Some(session) => (session.agent.clone(), session.agent_session_id.clone()),
                None => return,
            }
        };
        let mut event = AgentEvent::new(&agent, update.payload);
        event.session_id = Some(update.session_id);
        event.agent_session_id = agent_session_id;
        self.touch(update.session_id);
        self.emit(BridgeSignal::Event(event));
    }

    // ── health checks (driven by the loops in `health`) ───────────────────

    /// Reconcile internal sessions against live tmux sessions.
    pub async fn check_tmux_health(&self) {
        let live = match self.tmux.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                debug!("tmux health check skipped: {e}");
                return;
            }
        };
        let live_names: std::collections::HashSet<String> =
            live.into_iter().map(|s| s.name).collect();

        let checks: Vec<(Uuid, bool, SessionStatus)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .by_id
                .values()
                .filter(|s| s.kind == SessionKind::Internal)
                .filter_map(|s| {
                    s.tmux_session
                        .as_ref()
                        .map(|name| (s.id, live_names.contains(name), s.status))
                })
                .collect()
        };

        for (id, alive, status) in checks {
            if !alive && status != SessionStatus::Offline {
                self.apply_status(id, SessionStatus::Offline);
            } else if alive && status == SessionStatus::Offline {
                self.apply_status(id, SessionStatus::Idle);
            }
        }
    }

    /// Demote silently-working sessions to idle.
    pub fn check_working_timeout(&self) {
        let now = now_ms();
        let timeout = self.config.working_timeout_ms;
        let stale: Vec<Uuid> = {
            let inner = self.inner.lock().unwrap();
            inner
                .by_id
                .values()
                .filter(|s| s.status == SessionStatus::Working && now - s.last_activity > timeout)
                .map(|s| s.id)
                .collect()
        };
        for id in stale {
            debug!("Session {id} working timeout");
            self.apply_status(id, SessionStatus::Idle);
        }
    }

    /// Delete long-offline internal sessions and long-untouched sessions.
    pub async fn run_cleanup(&self) {
        let now = now_ms();
        let doomed: Vec<Uuid> = {
            let inner = self.inner.lock().unwrap();
            inner
                .by_id
                .values()
                .filter(|s| {
                    let long_offline = s.kind == SessionKind::Internal
                        && s.status == SessionStatus::Offline
                        && now - s.last_activity > self.config.offline_cleanup_ms;
                    let long_stale = now - s.last_activity > self.config.stale_cleanup_ms;
                    long_offline || long_stale
                })
                .map(|s| s.id)
                .collect()
        };
        for id in doomed {
            debug!("Cleanup deleting session {id}");
            let _ = self.delete(id).await;
        }
    }
}

/// Canonicalize, falling back to the raw path when resolution fails (the
/// directory may already be gone).
fn canonicalize_lossy(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn resolve_cwd(requested: Option<&Path>) -> PathBuf {
    let fallback = || cab_core::home::user_home().unwrap_or_else(|_| PathBuf::from("/tmp"));
    match requested {
        Some(path) => std::fs::canonicalize(path).unwrap_or_else(|_| fallback()),
        None => fallback(),
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
