//! Safe tmux invocation layer.
//!
//! Every argument reaches tmux through an argv array — nothing is ever
//! routed through a shell. The single exception is the *contents* of the
//! `command` given to [`TmuxDriver::create_session`], which is typed into
//! the new session with literal-mode `send-keys` rather than exec'd, so
//! shell metacharacters in it stay inert until the receiving shell sees
//! them as a single submitted line.
//!
//! Session names, filesystem paths, and pane ids are validated *before* any
//! subprocess is spawned; a malformed input never reaches tmux.

use cab_core::error::{BridgeError, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Settle time after `new-session` before typing the startup command; a
/// fresh shell needs a beat to install its line editor.
const SESSION_SETTLE_MS: u64 = 100;

/// Delay between pasting text and pressing Enter. A shorter pause races
/// against terminal processing on long prompts and drops characters.
const PASTE_TO_ENTER_DELAY_MS: u64 = 500;

/// Default number of scrollback lines captured by [`TmuxDriver::capture_pane`].
const DEFAULT_CAPTURE_START: i32 = -100;

/// Characters that make a path unsafe to hand to a subprocess argv that may
/// later be echoed into shell context.
const PATH_FORBIDDEN: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '\\', '\'', '"', '!', '#',
    '*', '?', '\n', '\r',
];

/// One live tmux session as reported by `list-sessions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSessionInfo {
    pub name: String,
    pub windows: u32,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    pub attached: bool,
}

/// Options for [`TmuxDriver::create_session`].
#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    pub cwd: Option<PathBuf>,
    /// Startup command typed into the session after it settles.
    pub command: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Options for [`TmuxDriver::send_keys`] and [`TmuxDriver::paste_buffer`].
#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    /// `true` when the target is a `%N` pane id instead of a session name.
    pub is_pane_id: bool,
    /// tmux server socket, for assistants on a non-default server.
    pub socket: Option<PathBuf>,
}

/// Options for [`TmuxDriver::capture_pane`].
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// First scrollback line (negative = into history). Defaults to −100.
    pub start_line: Option<i32>,
    /// Last line; defaults to the current visible end.
    pub end_line: Option<i32>,
}

/// Validate a tmux session name: non-empty, `[A-Za-z0-9_-]+` only.
pub fn validate_session_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(BridgeError::InvalidName(name.to_string()))
    }
}

/// Validate a filesystem path argument: non-empty and free of shell
/// metacharacters.
pub fn validate_path(path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() || text.chars().any(|c| PATH_FORBIDDEN.contains(&c)) {
        return Err(BridgeError::InvalidPath(text.to_string()));
    }
    Ok(())
}

/// Validate a pane id: `%` followed by one or more digits.
pub fn validate_pane_id(pane: &str) -> Result<()> {
    let mut chars = pane.chars();
    let ok = chars.next() == Some('%')
        && pane.len() > 1
        && chars.all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(BridgeError::InvalidPaneId(pane.to_string()))
    }
}

fn validate_target(target: &str, is_pane_id: bool) -> Result<()> {
    if is_pane_id {
        validate_pane_id(target)
    } else {
        validate_session_name(target)
    }
}

/// Thin async driver over the `tmux` binary.
///
/// Stateless apart from construction-time configuration; safe to share
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct TmuxDriver;

impl TmuxDriver {
    pub fn new() -> Self {
        Self
    }

    /// Run one tmux subcommand, yielding while the subprocess executes.
    ///
    /// A spawn failure with `NotFound` means the binary itself is missing
    /// and maps to [`BridgeError::TmuxUnavailable`].
    async fn run(&self, socket: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new("tmux");
        if let Some(socket) = socket {
            cmd.arg("-S").arg(socket);
        }
        cmd.args(args);
        debug!("tmux {}", args.join(" "));

        cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::TmuxUnavailable
            } else {
                BridgeError::subprocess(args.first().unwrap_or(&"tmux"), None, e.to_string())
            }
        })
    }

    /// Run a subcommand and classify a non-zero exit by stderr content.
    async fn run_checked(&self, socket: Option<&Path>, args: &[&str]) -> Result<Output> {
        let output = self.run(socket, args).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = args.first().copied().unwrap_or("tmux");
        if stderr.contains("duplicate session") {
            return Err(BridgeError::AlreadyExists(format!("tmux session ({stderr})")));
        }
        if stderr.contains("can't find") || stderr.contains("no server running") {
            return Err(BridgeError::NotFound(format!("tmux target ({stderr})")));
        }
        Err(BridgeError::subprocess(command, output.status.code(), stderr))
    }

    /// Check whether a tmux session with this exact name exists.
    pub async fn session_exists(&self, name: &str) -> Result<bool> {
        validate_session_name(name)?;
        // `=` forces an exact match instead of tmux's prefix matching.
        let target = format!("={name}");
        let output = self.run(None, &["has-session", "-t", &target]).await?;
        Ok(output.status.success())
    }

    /// Create a detached session, then type the startup command into it.
    ///
    /// Two-step on purpose: `new-session <command>` would end the session
    /// when the command exits, while a typed command leaves the shell
    /// underneath it alive.
    pub async fn create_session(&self, name: &str, opts: &CreateSessionOptions) -> Result<()> {
        validate_session_name(name)?;
        if let Some(cwd) = &opts.cwd {
            validate_path(cwd)?;
        }
        if self.session_exists(name).await? {
            return Err(BridgeError::AlreadyExists(format!("tmux session '{name}'")));
        }

        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            name.to_string(),
        ];
        if let Some(cwd) = &opts.cwd {
            args.push("-c".into());
            args.push(cwd.to_string_lossy().into_owned());
        }
        if let (Some(width), Some(height)) = (opts.width, opts.height) {
            args.push("-x".into());
            args.push(width.to_string());
            args.push("-y".into());
            args.push(height.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(None, &arg_refs).await?;

        if let Some(command) = &opts.command {
            // Let the shell finish initializing before we type at it.
            tokio::time::sleep(Duration::from_millis(SESSION_SETTLE_MS)).await;
            self.run_checked(None, &["send-keys", "-t", name, "-l", command])
                .await?;
            self.run_checked(None, &["send-keys", "-t", name, "Enter"])
                .await?;
        }

        debug!("Created tmux session '{name}'");
        Ok(())
    }

    /// Kill a session. Failures are logged and swallowed; returns whether
    /// the kill succeeded.
    pub async fn kill_session(&self, name: &str) -> Result<bool> {
        validate_session_name(name)?;
        match self.run_checked(None, &["kill-session", "-t", name]).await {
            Ok(_) => Ok(true),
            Err(BridgeError::TmuxUnavailable) => Err(BridgeError::TmuxUnavailable),
            Err(e) => {
                warn!("kill-session '{name}' failed (session may already be gone): {e}");
                Ok(false)
            }
        }
    }

    /// List live sessions on the default server.
    ///
    /// A missing server is an empty list, not an error.
    pub async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>> {
        let format = "#{session_name}\t#{session_windows}\t#{session_created}\t#{session_attached}";
        let output = self.run(None, &["list-sessions", "-F", format]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Ok(Vec::new());
            }
            return Err(BridgeError::subprocess(
                "list-sessions",
                output.status.code(),
                stderr.trim(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_session_line).collect())
    }

    /// Type literal text into a target. No Enter is sent.
    pub async fn send_keys(&self, target: &str, keys: &str, opts: &TargetOptions) -> Result<()> {
        validate_target(target, opts.is_pane_id)?;
        self.run_checked(opts.socket.as_deref(), &["send-keys", "-t", target, "-l", keys])
            .await?;
        Ok(())
    }

    /// Paste multi-line text into a target through tmux's paste buffer.
    ///
    /// The text goes to disk in a fresh temporary directory, is loaded with
    /// `load-buffer`, pasted, and — when `send_enter` — submitted after the
    /// absorb delay. The tempdir guard removes both file and directory on
    /// every exit path, early returns included.
    pub async fn paste_buffer(
        &self,
        target: &str,
        text: &str,
        send_enter: bool,
        opts: &TargetOptions,
    ) -> Result<()> {
        validate_target(target, opts.is_pane_id)?;

        let dir = tempfile::Builder::new()
            .prefix("cab-paste-")
            .tempdir()
            .map_err(|e| BridgeError::Io(format!("failed to create paste tempdir: {e}")))?;
        let file = dir.path().join("paste.txt");
        std::fs::write(&file, text)
            .map_err(|e| BridgeError::Io(format!("failed to write paste file: {e}")))?;

        let socket = opts.socket.as_deref();
        let file_arg = file.to_string_lossy().into_owned();
        self.run_checked(socket, &["load-buffer", &file_arg]).await?;
        self.run_checked(socket, &["paste-buffer", "-t", target]).await?;

        if send_enter {
            // The receiving terminal needs time to absorb a long paste
            // before the submit keypress.
            tokio::time::sleep(Duration::from_millis(PASTE_TO_ENTER_DELAY_MS)).await;
            self.run_checked(socket, &["send-keys", "-t", target, "Enter"])
                .await?;
        }

        Ok(())
    }

    /// Send Ctrl-C to a target session.
    pub async fn send_interrupt(&self, target: &str) -> Result<()> {
        validate_session_name(target)?;
        self.run_checked(None, &["send-keys", "-t", target, "C-c"])
            .await?;
        Ok(())
    }

    /// Capture visible pane scrollback.
    pub async fn capture_pane(&self, target: &str, opts: &CaptureOptions) -> Result<String> {
        if validate_pane_id(target).is_err() {
            validate_session_name(target)?;
        }
        let start = opts.start_line.unwrap_or(DEFAULT_CAPTURE_START).to_string();
        let mut args: Vec<String> = vec![
            "capture-pane".into(),
            "-p".into(),
            "-t".into(),
            target.to_string(),
            "-S".into(),
            start,
        ];
        if let Some(end) = opts.end_line {
            args.push("-E".into());
            args.push(end.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_checked(None, &arg_refs).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Driver interface the supervisor depends on.
///
/// Keeps the component graph a DAG and lets tests substitute an in-memory
/// tmux.
#[async_trait::async_trait]
pub trait TmuxControl: Send + Sync {
    async fn create_session(&self, name: &str, opts: &CreateSessionOptions) -> Result<()>;
    async fn kill_session(&self, name: &str) -> Result<bool>;
    async fn session_exists(&self, name: &str) -> Result<bool>;
    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>>;
    async fn send_keys(&self, target: &str, keys: &str, opts: &TargetOptions) -> Result<()>;
    async fn paste_buffer(
        &self,
        target: &str,
        text: &str,
        send_enter: bool,
        opts: &TargetOptions,
    ) -> Result<()>;
    async fn send_interrupt(&self, target: &str) -> Result<()>;
    async fn capture_pane(&self, target: &str, opts: &CaptureOptions) -> Result<String>;
}

#[async_trait::async_trait]
impl TmuxControl for TmuxDriver {
    async fn create_session(&self, name: &str, opts: &CreateSessionOptions) -> Result<()> {
        TmuxDriver::create_session(self, name, opts).await
    }

    async fn kill_session(&self, name: &str) -> Result<bool> {
        TmuxDriver::kill_session(self, name).await
    }

    async fn session_exists(&self, name: &str) -> Result<bool> {
        TmuxDriver::session_exists(self, name).await
    }

    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>> {
        TmuxDriver::list_sessions(self).await
    }

    async fn send_keys(&self, target: &str, keys: &str, opts: &TargetOptions) -> Result<()> {
        TmuxDriver::send_keys(self, target, keys, opts).await
    }

    async fn paste_buffer(
        &self,
        target: &str,
        text: &str,
        send_enter: bool,
        opts: &TargetOptions,
    ) -> Result<()> {
        TmuxDriver::paste_buffer(self, target, text, send_enter, opts).await
    }

    async fn send_interrupt(&self, target: &str) -> Result<()> {
        TmuxDriver::send_interrupt(self, target).await
    }

    async fn capture_pane(&self, target: &str, opts: &CaptureOptions) -> Result<String> {
        TmuxDriver::capture_pane(self, target, opts).await
    }
}

fn parse_session_line(line: &str) -> Option<TmuxSessionInfo> {
    let mut parts = line.split('\t');
    let name = parts.next()?.to_string();
    let windows = parts.next()?.parse().ok()?;
    let created_at = parts.next()?.parse().ok()?;
    let attached = parts.next()? != "0";
    Some(TmuxSessionInfo {
        name,
        windows,
        created_at,
        attached,
    })
}
