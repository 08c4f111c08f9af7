use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, RemoveKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::filter::{ChangeFilter, WatchSpec};
use crate::events::{EventEmitter, Subscription};

/// Quiet period that ends a burst of changes
pub const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("Cannot watch {path}: it does not exist")]
    MissingPath { path: PathBuf },
    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Debounced, lock-aware watcher that fires each changed path
///
/// Must be created inside a tokio runtime. Dropping it stops watching.
pub struct FileWatcher {
    name: &'static str,
    _watcher: RecommendedWatcher,
    events: EventEmitter<PathBuf>,
    task: JoinHandle<()>,
}

impl FileWatcher {
    /// Watch the state-bearing files inside `.git`
    pub fn dot_git(dot_git: &Path) -> Result<Self, WatchError> {
        let mut roots = vec![(dot_git.to_path_buf(), RecursiveMode::NonRecursive)];
        let refs = dot_git.join("refs");
        if refs.is_dir() {
            roots.push((refs, RecursiveMode::Recursive));
        }
        let digest = IndexDigest::new(dot_git.join("index"));
        Self::start("dot-git", WatchSpec::dot_git(dot_git), roots, Some(digest), DEBOUNCE)
    }

    /// Watch everything under `root` except `.git`
    pub fn working_tree(root: &Path, dot_git: &Path) -> Result<Self, WatchError> {
        let roots = vec![(root.to_path_buf(), RecursiveMode::Recursive)];
        Self::start("working-tree", WatchSpec::working_tree(root, dot_git), roots, None, DEBOUNCE)
    }

    fn start(
        name: &'static str,
        spec: WatchSpec,
        roots: Vec<(PathBuf, RecursiveMode)>,
        digest: Option<IndexDigest>,
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(WatchError::Init)?;

        for (path, mode) in &roots {
            if !path.exists() {
                return Err(WatchError::MissingPath { path: path.clone() });
            }
            watcher.watch(path, *mode).map_err(|source| WatchError::Notify {
                path: path.clone(),
                source,
            })?;
        }
        log::debug!("{} watcher started on {} path(s)", name, roots.len());

        let events = EventEmitter::new();
        let task = tokio::spawn(debounce_loop(
            name,
            rx,
            ChangeFilter::new(spec),
            digest,
            events.clone(),
            debounce,
        ));

        Ok(Self {
            name,
            _watcher: watcher,
            events,
            task,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The emitter changed paths are fired on
    pub fn events(&self) -> EventEmitter<PathBuf> {
        self.events.clone()
    }

    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PathBuf) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Directory creation/removal and plain reads say nothing about content
fn is_watchable(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    )
}

async fn debounce_loop(
    name: &'static str,
    mut rx: UnboundedReceiver<notify::Result<Event>>,
    mut filter: ChangeFilter,
    mut digest: Option<IndexDigest>,
    events: EventEmitter<PathBuf>,
    debounce: Duration,
) {
    let mut pending: Vec<PathBuf> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(Ok(event)) => {
                    if !is_watchable(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                    deadline = Some(Instant::now() + debounce);
                }
                Some(Err(e)) => log::warn!("{} watcher error: {}", name, e),
                None => break,
            },
            _ = wait_for(deadline) => {
                deadline = None;
                let locked = filter.spec().any_lock_exists();
                for path in pending.drain(..) {
                    for changed in filter.accept(&path, locked) {
                        if let Some(digest) = digest.as_mut() {
                            if digest.is_index(&changed) && !digest.changed() {
                                log::trace!("{} watcher: index content unchanged, skipping", name);
                                continue;
                            }
                        }
                        log::trace!("{} watcher event {}", name, changed.display());
                        events.fire(&changed);
                    }
                }
            }
        }
    }
    log::debug!("{} watcher stopped", name);
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Remembers the last index content so rewrites with identical bytes are dropped
struct IndexDigest {
    path: PathBuf,
    last: Option<Vec<u8>>,
}

impl IndexDigest {
    fn new(path: PathBuf) -> Self {
        Self { path, last: None }
    }

    fn is_index(&self, path: &Path) -> bool {
        path == self.path
    }

    /// Unreadable counts as changed
    fn changed(&mut self) -> bool {
        let Ok(bytes) = fs::read(&self.path) else {
            self.last = None;
            return true;
        };
        let digest = Sha256::digest(&bytes).to_vec();
        if self.last.as_ref() == Some(&digest) {
            return false;
        }
        self.last = Some(digest);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    async fn wait_until(seen: &Arc<Mutex<Vec<PathBuf>>>, predicate: impl Fn(&[PathBuf]) -> bool) -> bool {
        for _ in 0..60 {
            if predicate(&seen.lock().unwrap()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[test]
    fn test_index_digest_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index");
        std::fs::write(&index, b"one").unwrap();

        let mut digest = IndexDigest::new(index.clone());
        assert!(digest.changed());
        assert!(!digest.changed());
        std::fs::write(&index, b"two").unwrap();
        assert!(digest.changed());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileWatcher::working_tree(&dir.path().join("nope"), &dir.path().join("nope/.git"));
        assert!(matches!(result, Err(WatchError::MissingPath { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_working_tree_change_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir(root.join(".git")).unwrap();

        let watcher = FileWatcher::working_tree(&root, &root.join(".git")).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = watcher.subscribe(move |p| sink.lock().unwrap().push(p.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        std::fs::write(root.join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();

        assert!(wait_until(&seen, |s| s.iter().any(|p| p.ends_with("a.txt"))).await);
        assert!(!seen.lock().unwrap().iter().any(|p| p.starts_with(root.join(".git"))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_changes_held_while_index_locked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let dot_git = root.join(".git");
        std::fs::create_dir(&dot_git).unwrap();

        let watcher = FileWatcher::working_tree(&root, &dot_git).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = watcher.subscribe(move |p| sink.lock().unwrap().push(p.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dot_git.join("index.lock"), b"").unwrap();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(300)).await;
        assert!(seen.lock().unwrap().is_empty());

        std::fs::remove_file(dot_git.join("index.lock")).unwrap();
        assert!(wait_until(&seen, |s| s.iter().any(|p| p.ends_with("a.txt"))).await);
    }
}
