//! Fire-and-forget terminal-emulator spawning.
//!
//! Attaches a visible terminal window to a bridge-owned tmux session when
//! the platform has something to attach with. Strictly cosmetic: every
//! failure is logged and swallowed, and session creation never waits on or
//! fails because of this.

use std::process::Stdio;
use tracing::debug;

/// Candidate terminal emulators, tried in order. Each entry is the binary
/// plus the arguments that run `tmux attach -t <session>` inside it.
#[cfg(target_os = "macos")]
fn candidates(session: &str) -> Vec<(String, Vec<String>)> {
    vec![(
        "osascript".to_string(),
        vec![
            "-e".to_string(),
            format!(
                "tell application \"Terminal\" to do script \"tmux attach -t {session}\""
            ),
        ],
    )]
}

/// Candidate terminal emulators, tried in order.
///
/// These terminals exec their command argument directly (execvp, no shell),
/// so the attach command must stay split into separate argv elements — a
/// single `"tmux attach -t x"` string would be looked up as one binary
/// name and fail.
#[cfg(not(target_os = "macos"))]
fn candidates(session: &str) -> Vec<(String, Vec<String>)> {
    let attach = ["tmux", "attach", "-t", session].map(String::from);

    let mut exec_flag = vec!["-e".to_string()];
    exec_flag.extend(attach.iter().cloned());

    let mut double_dash = vec!["--".to_string()];
    double_dash.extend(attach.iter().cloned());

    vec![
        ("x-terminal-emulator".to_string(), exec_flag.clone()),
        ("gnome-terminal".to_string(), double_dash),
        ("xterm".to_string(), exec_flag),
    ]
}

/// Try to open a terminal window attached to `session`.
pub fn spawn_terminal(session: &str) {
    for (binary, args) in candidates(session) {
        match std::process::Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => {
                debug!("Spawned terminal via {binary} for tmux session '{session}'");
                return;
            }
            Err(e) => {
                debug!("Terminal candidate {binary} unavailable: {e}");
            }
        }
    }
    debug!("No terminal emulator available for tmux session '{session}'");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_attach_command_stays_split_into_argv_elements() {
        for (binary, args) in candidates("cab-12345678") {
            assert!(
                args.iter().all(|arg| !arg.contains(' ')),
                "{binary} packs a command line into one argv element: {args:?}"
            );
            let tmux = args
                .iter()
                .position(|arg| arg == "tmux")
                .unwrap_or_else(|| panic!("{binary} never invokes tmux: {args:?}"));
            assert_eq!(args[tmux + 1], "attach");
            assert_eq!(args[tmux + 2], "-t");
            assert_eq!(args[tmux + 3], "cab-12345678");
        }
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_candidate_order_prefers_platform_default() {
        let names: Vec<String> = candidates("cab-12345678")
            .into_iter()
            .map(|(binary, _)| binary)
            .collect();
        assert_eq!(names, ["x-terminal-emulator", "gnome-terminal", "xterm"]);
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_osascript_script_targets_session() {
        let candidates = candidates("cab-12345678");
        assert_eq!(candidates.len(), 1);
        let (binary, args) = &candidates[0];
        assert_eq!(binary, "osascript");
        // osascript takes a script string, so the embedded command line is
        // intentional here.
        assert!(args.iter().any(|arg| arg.contains("tmux attach -t cab-12345678")));
    }
}
