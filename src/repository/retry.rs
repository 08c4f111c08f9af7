//! Retrying operations that failed on transient lock contention

use std::future::Future;
use std::time::Duration;

use super::operation::OperationKind;
use crate::error::{GitError, GitErrorCode};

/// Failures on attempts up to and including this one may be retried
pub const MAX_RETRY_ATTEMPT: u32 = 10;

/// `RepositoryIsLocked` always qualifies; ref-lock and multi-branch rebase
/// failures only for kinds that touch remote refs.
pub fn is_retry_eligible(kind: OperationKind, err: &GitError) -> bool {
    match err.code {
        Some(GitErrorCode::RepositoryIsLocked) => true,
        Some(GitErrorCode::CantLockRef) | Some(GitErrorCode::CantRebaseMultipleBranches) => {
            kind.retries_ref_lock()
        }
        _ => false,
    }
}

/// Quadratic: attempt² × 50ms
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(50 * u64::from(attempt) * u64::from(attempt))
}

/// Run `op`, retrying eligible failures with quadratic backoff
pub async fn retry_run<T, F, Fut>(kind: OperationKind, mut op: F) -> Result<T, GitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt <= MAX_RETRY_ATTEMPT && is_retry_eligible(kind, &err) => {
                let delay = backoff(attempt);
                log::info!(
                    "{} failed ({}), retrying attempt {} in {:?}",
                    kind,
                    err.code.map(|c| c.to_string()).unwrap_or_default(),
                    attempt + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn failure(code: GitErrorCode) -> GitError {
        GitError::new(ErrorKind::NonZeroExit, "Failed to execute git").with_code(code)
    }

    #[test]
    fn test_backoff_is_quadratic() {
        assert_eq!(backoff(1), Duration::from_millis(50));
        assert_eq!(backoff(2), Duration::from_millis(200));
        assert_eq!(backoff(3), Duration::from_millis(450));
    }

    #[test]
    fn test_eligibility() {
        let locked = failure(GitErrorCode::RepositoryIsLocked);
        let ref_lock = failure(GitErrorCode::CantLockRef);
        assert!(is_retry_eligible(OperationKind::Commit, &locked));
        assert!(is_retry_eligible(OperationKind::Pull, &ref_lock));
        assert!(is_retry_eligible(OperationKind::Fetch, &failure(GitErrorCode::CantRebaseMultipleBranches)));
        assert!(!is_retry_eligible(OperationKind::Commit, &ref_lock));
        assert!(!is_retry_eligible(OperationKind::Pull, &failure(GitErrorCode::Conflict)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_retries_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let start = Instant::now();

        let result = retry_run(OperationKind::Pull, move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 3 {
                Err(failure(GitErrorCode::CantLockRef))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(50 + 200 + 450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineligible_kind_fails_immediately() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let start = Instant::now();

        let result: Result<(), _> = retry_run(OperationKind::Commit, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(failure(GitErrorCode::CantLockRef))
        })
        .await;

        assert!(result.unwrap_err().has_code(GitErrorCode::CantLockRef));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_is_bounded() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), _> = retry_run(OperationKind::Status, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(failure(GitErrorCode::RepositoryIsLocked))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRY_ATTEMPT + 1);
    }
}
