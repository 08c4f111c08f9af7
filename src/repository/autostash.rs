//! Stashing tracked changes around an operation that needs a clean tree

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ErrorKind, GitError};
use crate::parse::FileStatusEntry;

/// The two stash operations auto-stash needs
#[async_trait]
pub trait Stasher: Send + Sync + 'static {
    async fn create_stash(&self, message: Option<&str>, include_untracked: bool) -> Result<(), GitError>;
    async fn pop_stash(&self) -> Result<(), GitError>;
}

/// Any pending change other than untracked or ignored files
pub fn has_tracked_changes(entries: &[FileStatusEntry]) -> bool {
    entries.iter().any(|e| !e.is_untracked() && !e.is_ignored())
}

/// Run `op`, wrapped in stash push / stash pop when auto-stash applies
///
/// The pop is attempted on every exit path. When `op` returns, the pop runs as
/// its own task and is awaited, so dropping this future cannot interrupt it.
/// When `op` panics or this future is dropped mid-operation, the pop is spawned
/// on the current runtime. If both `op` and the pop fail, the operation's error
/// is returned and the pop failure is logged.
pub async fn maybe_auto_stash<S, T, Fut>(
    enabled: bool,
    entries: &[FileStatusEntry],
    stasher: Arc<S>,
    op: Fut,
) -> Result<T, GitError>
where
    S: Stasher + ?Sized,
    Fut: Future<Output = Result<T, GitError>>,
{
    if !enabled || !has_tracked_changes(entries) {
        return op.await;
    }

    stasher.create_stash(None, true).await?;
    log::debug!("Auto-stashed local changes");

    let guard = PopGuard::arm(Arc::clone(&stasher));
    let result = op.await;

    let pop = tokio::spawn(async move { stasher.pop_stash().await });
    guard.disarm();
    let popped = pop.await.unwrap_or_else(|e| {
        Err(GitError::new(
            ErrorKind::Generic,
            format!("Restoring auto-stashed changes did not finish: {}", e),
        ))
    });

    match (result, popped) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(pop)) => Err(pop),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(pop)) => {
            log::error!("Failed to restore auto-stashed changes after error ({}): {}", err, pop);
            Err(err)
        }
    }
}

/// Pops the stash from `Drop` unless disarmed
struct PopGuard<S: Stasher + ?Sized> {
    stasher: Option<Arc<S>>,
}

impl<S: Stasher + ?Sized> PopGuard<S> {
    fn arm(stasher: Arc<S>) -> Self {
        Self {
            stasher: Some(stasher),
        }
    }

    fn disarm(mut self) {
        self.stasher = None;
    }
}

impl<S: Stasher + ?Sized> Drop for PopGuard<S> {
    fn drop(&mut self) {
        let Some(stasher) = self.stasher.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Operation did not complete; restoring auto-stashed changes");
                handle.spawn(async move {
                    if let Err(e) = stasher.pop_stash().await {
                        log::error!("Failed to restore auto-stashed changes: {}", e);
                    }
                });
            }
            Err(_) => {
                log::error!("No runtime to restore auto-stashed changes; they remain in `git stash list`");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitErrorCode;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeStash {
        calls: Mutex<Vec<&'static str>>,
        depth: Mutex<usize>,
        fail_pop: bool,
        pop_delay: Duration,
    }

    impl FakeStash {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn depth(&self) -> usize {
            *self.depth.lock().unwrap()
        }
    }

    #[async_trait]
    impl Stasher for FakeStash {
        async fn create_stash(&self, _message: Option<&str>, include_untracked: bool) -> Result<(), GitError> {
            assert!(include_untracked);
            self.calls.lock().unwrap().push("stash");
            *self.depth.lock().unwrap() += 1;
            Ok(())
        }

        async fn pop_stash(&self) -> Result<(), GitError> {
            self.calls.lock().unwrap().push("pop");
            tokio::time::sleep(self.pop_delay).await;
            if self.fail_pop {
                return Err(GitError::new(ErrorKind::NonZeroExit, "pop failed").with_code(GitErrorCode::StashConflict));
            }
            *self.depth.lock().unwrap() -= 1;
            Ok(())
        }
    }

    fn modified() -> Vec<FileStatusEntry> {
        vec![FileStatusEntry {
            x: ' ',
            y: 'M',
            path: "a.txt".to_string(),
            rename: None,
        }]
    }

    fn untracked_only() -> Vec<FileStatusEntry> {
        vec![FileStatusEntry {
            x: '?',
            y: '?',
            path: "new.txt".to_string(),
            rename: None,
        }]
    }

    #[tokio::test]
    async fn test_disabled_or_clean_runs_directly() {
        let stash = Arc::new(FakeStash::default());
        let value = maybe_auto_stash(false, &modified(), Arc::clone(&stash), async { Ok(1) }).await;
        assert_eq!(value.unwrap(), 1);

        let value = maybe_auto_stash(true, &untracked_only(), Arc::clone(&stash), async { Ok(2) }).await;
        assert_eq!(value.unwrap(), 2);
        assert!(stash.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stash_run_pop_order() {
        let stash = Arc::new(FakeStash::default());
        let inner = Arc::clone(&stash);
        let value = maybe_auto_stash(true, &modified(), Arc::clone(&stash), async move {
            inner.calls.lock().unwrap().push("op");
            Ok("done")
        })
        .await;

        assert_eq!(value.unwrap(), "done");
        assert_eq!(stash.calls(), vec!["stash", "op", "pop"]);
        assert_eq!(stash.depth(), 0);
    }

    #[tokio::test]
    async fn test_pop_runs_when_operation_fails() {
        let stash = Arc::new(FakeStash::default());
        let result: Result<(), _> = maybe_auto_stash(true, &modified(), Arc::clone(&stash), async {
            Err(GitError::new(ErrorKind::NonZeroExit, "pull failed").with_code(GitErrorCode::Conflict))
        })
        .await;

        assert!(result.unwrap_err().has_code(GitErrorCode::Conflict));
        assert_eq!(stash.calls(), vec!["stash", "pop"]);
        assert_eq!(stash.depth(), 0);
    }

    #[tokio::test]
    async fn test_operation_error_wins_over_pop_error() {
        let stash = Arc::new(FakeStash {
            fail_pop: true,
            ..Default::default()
        });
        let result: Result<(), _> = maybe_auto_stash(true, &modified(), Arc::clone(&stash), async {
            Err(GitError::new(ErrorKind::NonZeroExit, "pull failed").with_code(GitErrorCode::Conflict))
        })
        .await;
        assert!(result.unwrap_err().has_code(GitErrorCode::Conflict));

        let result = maybe_auto_stash(true, &modified(), Arc::clone(&stash), async { Ok(()) }).await;
        assert!(result.unwrap_err().has_code(GitErrorCode::StashConflict));
    }

    #[tokio::test]
    async fn test_pop_runs_when_future_is_dropped() {
        let stash = Arc::new(FakeStash::default());
        let entries = modified();
        let pending = maybe_auto_stash(true, &entries, Arc::clone(&stash), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());

        for _ in 0..50 {
            if stash.depth() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stash.calls(), vec!["stash", "pop"]);
        assert_eq!(stash.depth(), 0);
    }

    #[tokio::test]
    async fn test_pop_finishes_when_dropped_while_popping() {
        let stash = Arc::new(FakeStash {
            pop_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let entries = modified();
        let pending = maybe_auto_stash(true, &entries, Arc::clone(&stash), async { Ok(()) });
        let timed_out = tokio::time::timeout(Duration::from_millis(30), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(stash.depth(), 1);

        for _ in 0..100 {
            if stash.depth() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stash.depth(), 0);
        assert_eq!(stash.calls(), vec!["stash", "pop"]);
    }

    #[tokio::test]
    async fn test_pop_runs_when_operation_panics() {
        let stash = Arc::new(FakeStash::default());
        let task_stash = Arc::clone(&stash);
        let handle = tokio::spawn(async move {
            let entries = modified();
            maybe_auto_stash(true, &entries, task_stash, async {
                if entries.len() == 1 {
                    panic!("operation blew up");
                }
                Ok(())
            })
            .await
        });
        assert!(handle.await.unwrap_err().is_panic());

        for _ in 0..50 {
            if stash.depth() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stash.depth(), 0);
    }
}
