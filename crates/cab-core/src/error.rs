//! Bridge error taxonomy.
//!
//! Every fallible operation in the bridge returns one of these tagged
//! variants; panics are never used for control flow. The API layer maps
//! variants onto HTTP status codes via [`BridgeError::http_status`].

/// Errors with structured variants, shared by the tmux driver, the adapter
/// registry, and the session supervisor.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid session name '{0}': must match [A-Za-z0-9_-]+")]
    InvalidName(String),

    #[error("invalid path '{0}': contains shell metacharacters or is empty")]
    InvalidPath(String),

    #[error("invalid pane id '{0}': must match %<digits>")]
    InvalidPaneId(String),

    #[error("invalid flag key '{0}'")]
    InvalidFlagKey(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("no adapter registered for agent '{0}'")]
    NoAdapter(String),

    #[error("session has no terminal to deliver to")]
    NoTerminal,

    #[error("session is offline")]
    SessionOffline,

    #[error("{0}")]
    NotSupported(String),

    #[error("tmux is not available on this system")]
    TmuxUnavailable,

    #[error("tmux {command} failed: {stderr}")]
    Subprocess {
        command: String,
        /// Exit code when the process exited normally; `None` on signal death.
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl BridgeError {
    /// HTTP status code for this error per the REST surface contract.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            _ => 400,
        }
    }

    /// Subprocess error from a finished tmux invocation.
    pub fn subprocess(command: &str, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Subprocess {
            command: command.to_string(),
            exit_code,
            stderr: stderr.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(BridgeError::NotFound("session".into()).http_status(), 404);
        assert_eq!(BridgeError::InvalidName("a b".into()).http_status(), 400);
        assert_eq!(BridgeError::NoTerminal.http_status(), 400);
        assert_eq!(
            BridgeError::subprocess("new-session", Some(1), "dup").http_status(),
            400
        );
    }

    #[test]
    fn test_subprocess_display() {
        let err = BridgeError::subprocess("kill-session", Some(1), "no such session");
        let msg = err.to_string();
        assert!(msg.contains("kill-session"));
        assert!(msg.contains("no such session"));
    }
}
