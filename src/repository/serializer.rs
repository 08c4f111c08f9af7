//! At-most-one admission for conflict-prone operations

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::operation::OperationKind;

/// Which kinds must not overlap each other within one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationPolicy {
    kinds: HashSet<OperationKind>,
}

impl SerializationPolicy {
    pub fn new(kinds: impl IntoIterator<Item = OperationKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn is_serialized(&self, kind: OperationKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl Default for SerializationPolicy {
    fn default() -> Self {
        Self::new([OperationKind::Pull, OperationKind::Push, OperationKind::Sync])
    }
}

/// Width-1 FIFO queue shared by every serialized kind of one repository
#[derive(Debug)]
pub struct SingleFlight {
    policy: SerializationPolicy,
    slot: Arc<Semaphore>,
}

impl SingleFlight {
    pub fn new(policy: SerializationPolicy) -> Self {
        Self {
            policy,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn policy(&self) -> &SerializationPolicy {
        &self.policy
    }

    /// Wait for the slot if `kind` is serialized
    ///
    /// Holding the returned permit keeps every other serialized call queued.
    /// Kinds outside the policy get `None` immediately.
    pub async fn admit(&self, kind: OperationKind) -> Option<OwnedSemaphorePermit> {
        if !self.policy.is_serialized(kind) {
            return None;
        }
        if self.slot.available_permits() == 0 {
            log::debug!("{} queued behind a running serialized operation", kind);
        }
        // The semaphore is never closed
        Arc::clone(&self.slot).acquire_owned().await.ok()
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new(SerializationPolicy::default())
    }
}
