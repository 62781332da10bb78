//! Polling watcher for the knowledge directory.
//!
//! A long-lived task compares directory snapshots once per poll interval and
//! publishes file events onto a single-consumer channel. A file's second
//! event within the debounce window of its first is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use verde_core::config::WatcherConfig;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    /// Created or modified: the file now has new content.
    pub fn is_write(&self) -> bool {
        matches!(self.kind, FileEventKind::Created | FileEventKind::Modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

type Snapshot = HashMap<PathBuf, Fingerprint>;

/// Regular files directly under `dir`, minus temp and lock files.
fn scan(dir: &Path) -> Snapshot {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Snapshot::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| !is_scratch_file(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file().then(|| {
                (
                    entry.path(),
                    Fingerprint {
                        modified: meta.modified().ok(),
                        len: meta.len(),
                    },
                )
            })
        })
        .collect()
}

fn is_scratch_file(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".tmp") || name.ends_with(".lock")
}

fn diff(old: &Snapshot, new: &Snapshot) -> Vec<FileEvent> {
    let mut events: Vec<FileEvent> = new
        .iter()
        .filter_map(|(path, fingerprint)| {
            let kind = match old.get(path) {
                None => FileEventKind::Created,
                Some(prev) if prev != fingerprint => FileEventKind::Modified,
                Some(_) => return None,
            };
            Some(FileEvent {
                path: path.clone(),
                kind,
            })
        })
        .chain(
            old.keys()
                .filter(|path| !new.contains_key(*path))
                .map(|path| FileEvent {
                    path: path.clone(),
                    kind: FileEventKind::Removed,
                }),
        )
        .collect();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

/// Per-file debounce: after an accepted event, further events for the same
/// file are dropped until `window` has elapsed.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(prev) = self.last_accepted.get(path) {
            if now.duration_since(*prev) < self.window {
                return false;
            }
        }
        self.last_accepted.insert(path.to_path_buf(), now);
        true
    }
}

pub struct KnowledgeWatcher {
    dir: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
}

impl KnowledgeWatcher {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            debounce,
        }
    }

    pub fn from_config(dir: impl Into<PathBuf>, config: &WatcherConfig) -> Self {
        Self::new(
            dir,
            Duration::from_millis(config.poll_interval_ms.max(10)),
            Duration::from_millis(config.debounce_ms),
        )
    }

    /// Starts the polling task. It runs until `cancel` fires or the
    /// receiver is dropped.
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<FileEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<FileEvent>, cancel: CancellationToken) {
        let mut baseline = scan(&self.dir);
        let mut debouncer = Debouncer::new(self.debounce);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "[Watcher] Watching {} ({}ms poll, {}ms debounce)",
            self.dir.display(),
            self.poll_interval.as_millis(),
            self.debounce.as_millis()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("[Watcher] Cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let current = scan(&self.dir);
                    let events = diff(&baseline, &current);
                    baseline = current;

                    for event in events {
                        if !debouncer.accept(&event.path, Instant::now()) {
                            tracing::debug!("[Watcher] Debounced {}", event.path.display());
                            continue;
                        }
                        tracing::debug!("[Watcher] {:?} {}", event.kind, event.path.display());
                        if tx.send(event).await.is_err() {
                            tracing::debug!("[Watcher] Receiver dropped, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fingerprint(len: u64) -> Fingerprint {
        Fingerprint {
            modified: None,
            len,
        }
    }

    #[test]
    fn diff_reports_changes() {
        let mut old = Snapshot::new();
        old.insert(PathBuf::from("a.json"), fingerprint(1));
        old.insert(PathBuf::from("b.json"), fingerprint(1));
        let mut new = Snapshot::new();
        new.insert(PathBuf::from("a.json"), fingerprint(2));
        new.insert(PathBuf::from("c.json"), fingerprint(1));

        let events = diff(&old, &new);
        let kinds: Vec<_> = events
            .iter()
            .map(|e| (e.path.to_string_lossy().into_owned(), e.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a.json".to_string(), FileEventKind::Modified),
                ("b.json".to_string(), FileEventKind::Removed),
                ("c.json".to_string(), FileEventKind::Created),
            ]
        );
        assert!(diff(&new, &new).is_empty());
    }

    #[test]
    fn scratch_files_are_not_watched() {
        assert!(is_scratch_file(".ml_output.json.tmp"));
        assert!(is_scratch_file("V0.lock"));
        assert!(!is_scratch_file("ml_output.json"));
    }

    #[test]
    fn debounce_window_is_per_file() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(2));
        let ml = Path::new("ml_output.json");
        let other = Path::new("design.json");

        assert!(debouncer.accept(ml, start));
        assert!(!debouncer.accept(ml, start + Duration::from_millis(1500)));
        assert!(debouncer.accept(other, start + Duration::from_millis(1500)));
        assert!(debouncer.accept(ml, start + Duration::from_millis(2100)));
    }

    #[tokio::test]
    async fn publishes_new_files_and_stops_on_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = KnowledgeWatcher::new(
            temp_dir.path(),
            Duration::from_millis(20),
            Duration::from_secs(2),
        );
        let cancel = CancellationToken::new();
        let (mut rx, handle) = watcher.spawn(cancel.clone());

        // let the baseline scan happen first
        tokio::time::sleep(Duration::from_millis(60)).await;
        let path = temp_dir.path().join("ml_output.json");
        std::fs::write(&path, r#"{"carbon":{},"energy":{}}"#).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.path, path);
        assert!(event.is_write());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
