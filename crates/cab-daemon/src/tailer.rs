//! Append-only line tailer.
//!
//! Emits one event per complete newline-terminated record appended to a
//! file, starting from end-of-file unless configured otherwise. Survives
//! truncation, rotation, deletion, and delayed creation: the watch target
//! is the parent directory, the byte offset resets to zero whenever the
//! file shrinks, and a partial trailing line is carried until the write
//! that completes it.
//!
//! Wake-ups come from two sources funneled into a single read routine: a
//! `notify` filesystem subscription and a periodic poll. Because the read
//! routine runs inside one task loop, reads can never overlap. If the
//! watch subscription errors it is dropped and re-created after a second;
//! polling continues regardless.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay before re-creating an errored watch subscription.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Signals surfaced by a running tailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// The tailer is positioned and watching.
    Ready,
    /// One complete, trimmed, non-empty record.
    Line(String),
    /// A recoverable error (watch subscription loss, read failure).
    Error(String),
}

/// Tailer configuration.
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// Start from byte 0 instead of the current end of file.
    pub from_start: bool,
    /// Periodic poll interval backing up the filesystem subscription.
    pub poll_interval: Duration,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            from_start: false,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Tails one file and emits [`TailEvent`]s until cancelled.
pub struct LineTailer {
    path: PathBuf,
    opts: TailerOptions,
}

impl LineTailer {
    pub fn new(path: PathBuf, opts: TailerOptions) -> Self {
        Self { path, opts }
    }

    /// Run until the token is cancelled. Consumes the tailer.
    pub async fn run(self, tx: mpsc::Sender<TailEvent>, cancel: CancellationToken) {
        let mut offset: u64 = 0;
        let mut carry = String::new();

        if !self.opts.from_start {
            if let Ok(meta) = tokio::fs::metadata(&self.path).await {
                offset = meta.len();
            }
        }

        let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        let mut watcher = subscribe(&self.path, watch_tx.clone());

        if tx.send(TailEvent::Ready).await.is_err() {
            return;
        }

        // Catch up on anything written before the subscription existed.
        self.read_new(&mut offset, &mut carry, &tx).await;

        let mut poll = tokio::time::interval(self.opts.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Tailer for {} shutting down", self.path.display());
                    break;
                }
                _ = poll.tick() => {
                    self.read_new(&mut offset, &mut carry, &tx).await;
                }
                event = watch_rx.recv() => {
                    match event {
                        Some(Ok(event)) => {
                            if is_relevant(&event, &self.path) {
                                self.read_new(&mut offset, &mut carry, &tx).await;
                            }
                        }
                        Some(Err(e)) => {
                            let _ = tx.send(TailEvent::Error(format!("watch error: {e}"))).await;
                            drop(watcher.take());
                            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                            watcher = subscribe(&self.path, watch_tx.clone());
                        }
                        None => {
                            // Sender side gone; keep polling only.
                            watcher = None;
                        }
                    }
                }
            }
        }
    }

    /// Read bytes appended since `offset`, splitting complete lines out of
    /// the carry buffer. Resets on truncation; tolerates a missing file.
    async fn read_new(&self, offset: &mut u64, carry: &mut String, tx: &mpsc::Sender<TailEvent>) {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(_) => {
                // Deleted or not created yet: forget everything and keep
                // polling for recreation.
                *offset = 0;
                carry.clear();
                return;
            }
        };

        let size = match file.metadata().await {
            Ok(m) => m.len(),
            Err(e) => {
                let _ = tx.send(TailEvent::Error(format!("stat failed: {e}"))).await;
                return;
            }
        };

        if size < *offset {
            debug!(
                "{} truncated ({} -> {} bytes), restarting from 0",
                self.path.display(),
                offset,
                size
            );
            *offset = 0;
            carry.clear();
        }
        if size == *offset {
            return;
        }

        if let Err(e) = file.seek(SeekFrom::Start(*offset)).await {
            let _ = tx.send(TailEvent::Error(format!("seek failed: {e}"))).await;
            return;
        }

        let mut buf = vec![0u8; (size - *offset) as usize];
        match file.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) => {
                warn!("Short read on {}: {e}", self.path.display());
                return;
            }
        }
        *offset = size;
        carry.push_str(&String::from_utf8_lossy(&buf));

        // Everything before the last '\n' is complete; the rest carries over.
        let Some(last_newline) = carry.rfind('\n') else {
            return;
        };
        let rest = carry.split_off(last_newline + 1);
        let complete = std::mem::replace(carry, rest);

        for line in complete.split('\n') {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if tx.send(TailEvent::Line(trimmed.to_string())).await.is_err() {
                return;
            }
        }
    }
}

/// Create a notify watcher on the file's parent directory.
///
/// Watching the parent rather than the file itself is what lets us see a
/// file that does not exist yet, and survives rename-based rotation.
fn subscribe(
    path: &Path,
    tx: mpsc::UnboundedSender<notify::Result<notify::Event>>,
) -> Option<RecommendedWatcher> {
    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    });
    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            warn!("Failed to create file watcher for {}: {e}", path.display());
            return None;
        }
    };
    let watch_dir = path.parent().unwrap_or(Path::new("."));
    if let Err(e) = watcher.watch(watch_dir, RecursiveMode::NonRecursive) {
        warn!("Failed to watch {}: {e}", watch_dir.display());
        return None;
    }
    Some(watcher)
}

/// Returns `true` if this notify event is for (or plausibly near) the
/// target file. Metadata-only changes are ignored.
fn is_relevant(event: &notify::Event, target: &Path) -> bool {
    let is_data_event = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(notify::event::ModifyKind::Data(_))
            | EventKind::Modify(notify::event::ModifyKind::Any)
            | EventKind::Modify(notify::event::ModifyKind::Other)
    );
    if !is_data_event {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }
    let target_name = target.file_name();
    event
        .paths
        .iter()
        .any(|p| p == target || (p.file_name().is_some() && p.file_name() == target_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(3);

    fn fast_opts(from_start: bool) -> TailerOptions {
        TailerOptions {
            from_start,
            poll_interval: Duration::from_millis(25),
        }
    }

    async fn next_line(rx: &mut mpsc::Receiver<TailEvent>) -> String {
        loop {
            match timeout(WAIT, rx.recv()).await.expect("timed out").unwrap() {
                TailEvent::Line(line) => return line,
                TailEvent::Ready | TailEvent::Error(_) => continue,
            }
        }
    }

    fn start(
        path: PathBuf,
        from_start: bool,
    ) -> (mpsc::Receiver<TailEvent>, CancellationToken) {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let tailer = LineTailer::new(path, fast_opts(from_start));
        let run_cancel = cancel.clone();
        tokio::spawn(async move { tailer.run(tx, run_cancel).await });
        (rx, cancel)
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_emits_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        append(&path, "one\ntwo\n");

        assert_eq!(next_line(&mut rx).await, "one");
        assert_eq!(next_line(&mut rx).await, "two");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_starts_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "old line\n").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        // Give the tailer a moment to position, then append.
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&path, "new line\n");

        assert_eq!(next_line(&mut rx).await, "new line");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_from_start_reads_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "first\n").unwrap();

        let (mut rx, cancel) = start(path.clone(), true);
        assert_eq!(next_line(&mut rx).await, "first");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_file_created_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let (mut rx, cancel) = start(path.clone(), false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "born late\n").unwrap();

        assert_eq!(next_line(&mut rx).await, "born late");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_truncation_resets_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        append(&path, "before truncate\n");
        assert_eq!(next_line(&mut rx).await, "before truncate");

        std::fs::write(&path, "").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&path, "after truncate\n");

        assert_eq!(next_line(&mut rx).await, "after truncate");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_delete_and_recreate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        append(&path, "alive\n");
        assert_eq!(next_line(&mut rx).await, "alive");

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "reborn\n").unwrap();

        assert_eq!(next_line(&mut rx).await, "reborn");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_partial_line_completed_on_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        append(&path, "half");
        // The fragment must not be emitted yet; wait out a few poll cycles.
        tokio::time::sleep(Duration::from_millis(150)).await;
        append(&path, " and whole\ntrailing");

        assert_eq!(next_line(&mut rx).await, "half and whole");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_blank_lines_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "").unwrap();

        let (mut rx, cancel) = start(path.clone(), false);
        append(&path, "\n   \nreal\n");

        assert_eq!(next_line(&mut rx).await, "real");
        cancel.cancel();
    }

    #[test]
    fn test_is_relevant_filters_by_file_name() {
        let target = Path::new("/data/events.jsonl");
        let event = notify::Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("/data/events.jsonl")],
            attrs: Default::default(),
        };
        assert!(is_relevant(&event, target));

        let other = notify::Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("/data/unrelated.log")],
            attrs: Default::default(),
        };
        assert!(!is_relevant(&other, target));

        let metadata_only = notify::Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Metadata(
                notify::event::MetadataKind::Any,
            )),
            paths: vec![PathBuf::from("/data/events.jsonl")],
            attrs: Default::default(),
        };
        assert!(!is_relevant(&metadata_only, target));
    }
}
