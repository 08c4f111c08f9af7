//! One git working tree and everything that coordinates operations on it
//!
//! [`Repository::run`] is the single entry point for operations: it refuses work
//! after disposal, serializes conflict-prone kinds, tracks the operation in the
//! registry, retries transient lock failures and refreshes the model after
//! anything that may have changed the repository.

pub mod autostash;
pub mod model;
pub mod operation;
pub mod registry;
pub mod retry;
pub mod serializer;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{ErrorKind, GitError, GitErrorCode};
use crate::events::{EventEmitter, Subscription};
use crate::git::{self, Branch, FetchOptions, ForcePushMode, PullOptions, PushOptions, TransferLimits};
use crate::parse::{ConfigEntry, ConfigError, ConfigScope, ConfigValue, Stash};
use crate::process::{AbortSignal, GitContext};
use crate::settings::Settings;

pub use autostash::{has_tracked_changes, maybe_auto_stash, Stasher};
pub use model::{pigeonhole, FileStatus, RepositoryModel, Resource, ResourceGroups};
pub use operation::OperationKind;
pub use registry::OperationRegistry;
pub use retry::{backoff, is_retry_eligible, retry_run, MAX_RETRY_ATTEMPT};
pub use serializer::{SerializationPolicy, SingleFlight};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    OperationStarted(OperationKind),
    OperationEnded(OperationKind),
    /// The model was replaced after a status refresh
    DidChangeState,
    /// Something git tracks inside `.git` changed on disk
    DotGitChanged(PathBuf),
    Disposed,
}

pub struct Repository {
    root: PathBuf,
    dot_git: PathBuf,
    git: Arc<GitContext>,
    settings: Settings,
    registry: Mutex<OperationRegistry>,
    single_flight: SingleFlight,
    model: RwLock<RepositoryModel>,
    refresh_lock: tokio::sync::Mutex<()>,
    stasher: Arc<GitStasher>,
    disposed: AtomicBool,
    events: EventEmitter<RepositoryEvent>,
}

impl Repository {
    pub fn new(git: Arc<GitContext>, root: impl Into<PathBuf>, dot_git: impl Into<PathBuf>, settings: Settings) -> Self {
        let root = root.into();
        let policy = SerializationPolicy::new(settings.serialized_operations.iter().copied());
        Self {
            stasher: Arc::new(GitStasher {
                git: Arc::clone(&git),
                root: root.clone(),
            }),
            root,
            dot_git: dot_git.into(),
            git,
            settings,
            registry: Mutex::new(OperationRegistry::new()),
            single_flight: SingleFlight::new(policy),
            model: RwLock::new(RepositoryModel::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
            events: EventEmitter::new(),
        }
    }

    /// Open the repository containing `path`
    pub async fn open(git: Arc<GitContext>, path: &Path, settings: Settings) -> Result<Self, GitError> {
        let root = git::toplevel::show_toplevel(&git, path).await?;
        let dot_git = git::toplevel::git_dir(&git, &root).await?;
        log::info!("Opened repository {} (git dir {})", root.display(), dot_git.display());
        Ok(Self::new(git, root, dot_git, settings))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dot_git(&self) -> &Path {
        &self.dot_git
    }

    pub fn git(&self) -> &Arc<GitContext> {
        &self.git
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A copy of the current model
    pub fn model(&self) -> RepositoryModel {
        self.model.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn head(&self) -> Option<Branch> {
        self.model.read().unwrap_or_else(PoisonError::into_inner).head.clone()
    }

    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn is_idle(&self) -> bool {
        self.registry().is_idle()
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.registry().is_running(kind)
    }

    pub fn should_show_progress(&self) -> bool {
        self.registry().should_show_progress()
    }

    pub fn running_operations(&self) -> Vec<OperationKind> {
        self.registry().running()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stop accepting operations; fires `Disposed` once
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            log::info!("Disposing repository {}", self.root.display());
            self.events.fire(&RepositoryEvent::Disposed);
        }
    }

    fn registry(&self) -> MutexGuard<'_, OperationRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one logical operation
    ///
    /// `op` is called again for each retry, so it must build its git
    /// invocations from scratch every time.
    pub async fn run<T, F, Fut>(&self, kind: OperationKind, op: F) -> Result<T, GitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitError>>,
    {
        if self.is_disposed() {
            return Err(GitError::new(
                ErrorKind::Generic,
                format!("Repository {} has been disposed", self.root.display()),
            ));
        }

        let _permit = self.single_flight.admit(kind).await;
        let _guard = OperationGuard::start(self, kind);

        let result = retry_run(kind, op).await;
        match &result {
            Err(err) if err.has_code(GitErrorCode::NotAGitRepository) => {
                log::warn!("{} is no longer a git repository", self.root.display());
                self.dispose();
            }
            Ok(_) if !kind.is_read_only() => {
                if let Err(e) = self.refresh_model().await {
                    log::warn!("Failed to refresh {} after {}: {}", self.root.display(), kind, e);
                }
            }
            _ => {}
        }
        result
    }

    /// Re-read status, HEAD, refs and remotes and publish them as the model
    pub async fn refresh_model(&self) -> Result<(), GitError> {
        let _refreshing = self.refresh_lock.lock().await;

        let status = git::status::status(&self.git, &self.root, self.settings.status_limit, None).await?;
        if status.did_hit_limit {
            log::warn!(
                "Too many changes in {}; showing the first {}",
                self.root.display(),
                self.settings.status_limit
            );
        }

        let head = match git::head::head_branch(&self.git, &self.root).await {
            Ok(head) => Some(head),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };
        let refs = git::remote::refs(&self.git, &self.root).await.unwrap_or_else(|e| {
            log::warn!("Failed to list refs: {}", e);
            Vec::new()
        });
        let remotes = git::remote::remotes(&self.git, &self.root).await.unwrap_or_else(|e| {
            log::warn!("Failed to list remotes: {}", e);
            Vec::new()
        });

        let next = RepositoryModel {
            head,
            refs,
            remotes,
            groups: pigeonhole(&self.root, &status.entries),
            entries: status.entries,
            did_hit_limit: status.did_hit_limit,
        };
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = next;

        self.events.fire(&RepositoryEvent::DidChangeState);
        Ok(())
    }

    pub async fn status(&self) -> Result<(), GitError> {
        self.run(OperationKind::Status, || self.refresh_model()).await
    }

    /// Network commands run under `network_timeout` rather than the read timeout
    fn transfer_limits(&self, signal: Option<&AbortSignal>) -> TransferLimits {
        TransferLimits {
            timeout: self.settings.network_timeout,
            signal: signal.cloned(),
        }
    }

    /// Fetch; `prune_on_fetch` turns pruning on when the caller did not
    pub async fn fetch(&self, mut options: FetchOptions, signal: Option<&AbortSignal>) -> Result<(), GitError> {
        options.prune |= self.settings.prune_on_fetch;
        let limits = self.transfer_limits(signal);
        let (context, root, options, limits) = (&self.git, &self.root, &options, &limits);
        self.run(OperationKind::Fetch, move || git::remote::fetch(context, root, options, limits))
            .await
    }

    /// Pull into the current branch
    ///
    /// Without an explicit remote and branch, HEAD's upstream is used.
    pub async fn pull(
        &self,
        rebase: bool,
        remote: Option<&str>,
        branch: Option<&str>,
        unshallow: bool,
        signal: Option<&AbortSignal>,
    ) -> Result<(), GitError> {
        let (remote, branch) = match (remote, branch) {
            (Some(remote), Some(branch)) => (Some(remote.to_string()), Some(branch.to_string())),
            _ => match self.head().and_then(|h| h.upstream) {
                Some(up) => (Some(up.remote), Some(up.name)),
                None => (None, None),
            },
        };
        let options = PullOptions {
            rebase,
            remote,
            branch,
            tags: self.settings.pull_tags,
            unshallow,
        };

        let limits = self.transfer_limits(signal);
        let (options, limits) = (&options, &limits);
        self.run(OperationKind::Pull, move || self.stashed_pull(options, limits)).await
    }

    /// Push, by default HEAD to `<remote> <name>:<upstream>`
    pub async fn push(&self, mut options: PushOptions, signal: Option<&AbortSignal>) -> Result<(), GitError> {
        if options.remote.is_none() && options.name.is_none() {
            if let Some(head) = self.head() {
                if let (Some(name), Some(up)) = (head.name, head.upstream) {
                    options.remote = Some(up.remote);
                    options.name = Some(format!("{}:{}", name, up.name));
                }
            }
        }

        let limits = self.transfer_limits(signal);
        let (context, root, options, limits) = (&self.git, &self.root, &options, &limits);
        self.run(OperationKind::Push, move || git::remote::push(context, root, options, limits))
            .await
    }

    /// Push HEAD to a named remote, optionally forcing
    pub async fn push_to(&self, remote: &str, name: &str, set_upstream: bool, force: Option<ForcePushMode>) -> Result<(), GitError> {
        let options = PushOptions {
            remote: Some(remote.to_string()),
            name: Some(name.to_string()),
            set_upstream,
            force,
            ..Default::default()
        };
        self.push(options, None).await
    }

    /// Pull, then push `<name>:<upstream>` when HEAD has local commits
    ///
    /// The push is skipped for read-only remotes and when HEAD was known not
    /// to be ahead before the pull.
    pub async fn sync(&self, rebase: bool, signal: Option<&AbortSignal>) -> Result<(), GitError> {
        let head = self.head();
        let upstream = head.as_ref().and_then(|h| Some((h.name.clone()?, h.upstream.clone()?)));

        let pull = PullOptions {
            rebase,
            remote: upstream.as_ref().map(|(_, up)| up.remote.clone()),
            branch: upstream.as_ref().map(|(_, up)| up.name.clone()),
            tags: self.settings.pull_tags,
            unshallow: false,
        };
        let push = PushOptions {
            remote: upstream.as_ref().map(|(_, up)| up.remote.clone()),
            name: upstream.as_ref().map(|(name, up)| format!("{}:{}", name, up.name)),
            follow_tags: self.settings.follow_tags_when_sync,
            ..Default::default()
        };
        let read_only = match &pull.remote {
            Some(name) => self
                .model
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .remote(name)
                .map_or(false, |r| r.is_read_only),
            None => false,
        };
        let should_push = !read_only && head.as_ref().map_or(false, |h| h.ahead.map_or(true, |ahead| ahead > 0));

        let limits = self.transfer_limits(signal);
        let (pull, push, limits) = (&pull, &push, &limits);
        self.run(OperationKind::Sync, move || async move {
            self.stashed_pull(pull, limits).await?;
            if should_push {
                git::remote::push(&self.git, &self.root, push, limits).await?;
            } else {
                log::debug!("Nothing to push after sync of {}", self.root.display());
            }
            Ok(())
        })
        .await
    }

    /// Optional fetch-all then pull, wrapped in auto-stash
    async fn stashed_pull(&self, options: &PullOptions, limits: &TransferLimits) -> Result<(), GitError> {
        let entries = self.model.read().unwrap_or_else(PoisonError::into_inner).entries.clone();
        let work = async {
            if self.settings.fetch_on_pull {
                let all = FetchOptions {
                    all: true,
                    ..Default::default()
                };
                git::remote::fetch(&self.git, &self.root, &all, limits).await?;
            }
            git::remote::pull(&self.git, &self.root, options, limits).await
        };
        maybe_auto_stash(self.settings.auto_stash, &entries, Arc::clone(&self.stasher), work).await
    }

    pub async fn stash(&self, message: Option<&str>, include_untracked: bool) -> Result<(), GitError> {
        self.run(OperationKind::Stash, || {
            git::stash::create(&self.git, &self.root, message, include_untracked)
        })
        .await
    }

    pub async fn stash_pop(&self, index: Option<usize>) -> Result<(), GitError> {
        self.run(OperationKind::Stash, || git::stash::pop(&self.git, &self.root, index))
            .await
    }

    pub async fn stash_apply(&self, index: Option<usize>) -> Result<(), GitError> {
        self.run(OperationKind::Stash, || git::stash::apply(&self.git, &self.root, index))
            .await
    }

    pub async fn stash_drop(&self, index: Option<usize>) -> Result<(), GitError> {
        self.run(OperationKind::Stash, || git::stash::drop(&self.git, &self.root, index))
            .await
    }

    pub async fn stash_list(&self) -> Result<Vec<Stash>, GitError> {
        git::stash::list(&self.git, &self.root).await
    }

    /// Which of `paths` (relative to the root) are ignored
    pub async fn check_ignore(&self, paths: &[String]) -> Result<Vec<String>, GitError> {
        self.run(OperationKind::CheckIgnore, move || async move {
            Ok(git::status::check_ignore(&self.git, &self.root, paths).await?)
        })
        .await
    }

    /// Untracked, non-ignored paths relative to the root
    pub async fn untracked(&self) -> Result<Vec<String>, GitError> {
        self.run(OperationKind::Status, move || async move {
            Ok(git::status::untracked(&self.git, &self.root).await?)
        })
        .await
    }

    pub async fn get_config(&self, scope: ConfigScope, key: &str) -> Result<ConfigValue, ConfigError> {
        let _guard = OperationGuard::start(self, OperationKind::Config);
        git::config::read(&self.git, &self.root, scope, key).await
    }

    pub async fn get_config_all(&self, scope: ConfigScope) -> Result<Vec<ConfigEntry>, ConfigError> {
        let _guard = OperationGuard::start(self, OperationKind::Config);
        git::config::read_all(&self.git, &self.root, scope).await
    }

    /// Forward a `.git` change to subscribers
    pub fn on_dot_git_change(&self, path: &Path) {
        if !self.is_disposed() {
            self.events.fire(&RepositoryEvent::DotGitChanged(path.to_path_buf()));
        }
    }

    /// Refresh after a working-tree change unless something is already modifying the repository
    pub async fn on_working_tree_change(&self) {
        if !self.settings.autorefresh || self.is_disposed() {
            return;
        }
        if !self.is_idle() {
            log::debug!("Skipping refresh of {}; operations running", self.root.display());
            return;
        }
        if let Err(e) = self.status().await {
            log::warn!("Auto-refresh of {} failed: {}", self.root.display(), e);
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("dot_git", &self.dot_git)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Keeps one operation registered for as long as it lives
struct OperationGuard<'a> {
    repository: &'a Repository,
    kind: OperationKind,
}

impl<'a> OperationGuard<'a> {
    fn start(repository: &'a Repository, kind: OperationKind) -> Self {
        repository.registry().start(kind);
        repository.events.fire(&RepositoryEvent::OperationStarted(kind));
        Self { repository, kind }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.repository.registry().end(self.kind);
        self.repository.events.fire(&RepositoryEvent::OperationEnded(self.kind));
    }
}

/// Stash commands against one working tree
pub struct GitStasher {
    git: Arc<GitContext>,
    root: PathBuf,
}

#[async_trait]
impl Stasher for GitStasher {
    async fn create_stash(&self, message: Option<&str>, include_untracked: bool) -> Result<(), GitError> {
        git::stash::create(&self.git, &self.root, message, include_untracked).await
    }

    async fn pop_stash(&self) -> Result<(), GitError> {
        git::stash::pop(&self.git, &self.root, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::PersistentContext;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn repository() -> Repository {
        let git = Arc::new(GitContext::new("/nonexistent/git", "2.40.0", PersistentContext::default()));
        Repository::new(git, "/nonexistent/repo", "/nonexistent/repo/.git", Settings::default())
    }

    fn recorder(repo: &Repository) -> (Arc<Mutex<Vec<RepositoryEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = repo.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (events, subscription)
    }

    #[tokio::test]
    async fn test_run_tracks_operation_and_fires_events() {
        let repo = repository();
        let (events, _subscription) = recorder(&repo);

        let r = &repo;
        let seen_running = repo
            .run(OperationKind::Config, move || async move { Ok(r.is_running(OperationKind::Config)) })
            .await
            .unwrap();

        assert!(seen_running);
        assert!(!repo.is_running(OperationKind::Config));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                RepositoryEvent::OperationStarted(OperationKind::Config),
                RepositoryEvent::OperationEnded(OperationKind::Config),
            ]
        );
    }

    #[tokio::test]
    async fn test_not_a_repository_disposes() {
        let repo = repository();
        let (events, _subscription) = recorder(&repo);

        let result: Result<(), _> = repo
            .run(OperationKind::Commit, || async {
                Err(GitError::new(ErrorKind::NonZeroExit, "Failed to execute git").with_code(GitErrorCode::NotAGitRepository))
            })
            .await;
        assert!(result.unwrap_err().has_code(GitErrorCode::NotAGitRepository));
        assert!(repo.is_disposed());
        assert!(events.lock().unwrap().contains(&RepositoryEvent::Disposed));

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let refused: Result<(), _> = repo
            .run(OperationKind::Status, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(refused.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_operation_still_ends() {
        let repo = repository();
        let pending = repo.run(OperationKind::Commit, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), pending).await.is_err());
        assert!(repo.is_idle());
        assert!(repo.running_operations().is_empty());
    }

    #[tokio::test]
    async fn test_mutating_operation_is_not_idle() {
        let repo = repository();
        let r = &repo;
        let idle = repo
            .run(OperationKind::Commit, move || async move { Ok(r.is_idle()) })
            .await
            .unwrap();
        assert!(!idle);
        assert!(repo.is_idle());
    }

    #[tokio::test]
    async fn test_working_tree_change_respects_autorefresh() {
        let git = Arc::new(GitContext::new("/nonexistent/git", "2.40.0", PersistentContext::default()));
        let settings = Settings {
            autorefresh: false,
            ..Settings::default()
        };
        let repo = Repository::new(git, "/nonexistent/repo", "/nonexistent/repo/.git", settings);
        let (events, _subscription) = recorder(&repo);

        repo.on_working_tree_change().await;
        assert!(events.lock().unwrap().is_empty());
    }

    /// `/bin/sh` stands in for git, so `git pull ...` runs `<root>/pull` as a script
    #[cfg(unix)]
    fn scripted(root: &Path, read_timeout: Duration, settings: Settings) -> Repository {
        let persistent = PersistentContext {
            timeout: read_timeout,
            ..Default::default()
        };
        let git = Arc::new(GitContext::new("/bin/sh", "2.40.0", persistent));
        Repository::new(git, root, root.join(".git"), settings)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_outlives_read_timeout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pull"), "sleep 0.4\n").unwrap();
        let repo = scripted(dir.path(), Duration::from_millis(100), Settings::default());

        repo.pull(false, None, None, false, None).await.unwrap();
        assert!(repo.is_idle());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_network_timeout_bounds_pull() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pull"), "sleep 5\n").unwrap();
        let settings = Settings {
            network_timeout: Some(Duration::from_millis(100)),
            ..Settings::default()
        };
        let repo = scripted(dir.path(), Duration::from_secs(30), settings);

        let err = repo.pull(false, None, None, false, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_can_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pull"), "sleep 5\n").unwrap();
        let repo = scripted(dir.path(), Duration::from_millis(100), Settings::default());

        let controller = crate::process::AbortController::new();
        let signal = controller.signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.abort();
        });

        let start = std::time::Instant::now();
        let err = repo.pull(false, None, None, false, Some(&signal)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(repo.is_idle());
    }

    #[test]
    fn test_dot_git_change_is_forwarded() {
        let repo = repository();
        let (events, _subscription) = recorder(&repo);
        repo.on_dot_git_change(Path::new("/nonexistent/repo/.git/HEAD"));
        assert_eq!(
            *events.lock().unwrap(),
            vec![RepositoryEvent::DotGitChanged(PathBuf::from("/nonexistent/repo/.git/HEAD"))]
        );
    }
}
