//! Cooperative cancellation for git invocations

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of a cancellation signal
///
/// Aborting is sticky: once aborted, every current and future [`AbortSignal`]
/// handed out by this controller reports aborted.
#[derive(Debug, Clone)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
    // Held so the channel stays open while the controller lives
    _rx: watch::Receiver<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            _rx: rx,
        }
    }

    /// A controller that also aborts when `parent` does
    ///
    /// Must be called inside a tokio runtime when `parent` is given.
    pub fn child_of(parent: Option<&AbortSignal>) -> Self {
        let controller = Self::new();
        let Some(parent) = parent else {
            return controller;
        };
        if parent.is_aborted() {
            controller.abort();
            return controller;
        }

        let parent = parent.clone();
        let tx = Arc::clone(&controller.tx);
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.aborted() => {
                    let _ = tx.send(true);
                }
                _ = tx.closed() => {}
            }
        });
        controller
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once aborted; pends forever if the controller is dropped unaborted
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
