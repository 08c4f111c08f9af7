//! Observer-pattern event channels
//!
//! An [`EventEmitter`] holds any number of independent listeners. Subscribing returns
//! a [`Subscription`] token; dropping the token (or calling
//! [`Subscription::dispose`]) removes exactly that listener.

use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Broadcasts values of type `T` to registered listeners
pub struct EventEmitter<T> {
    inner: Arc<Mutex<Listeners<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener; it stays registered until the returned token is dropped
    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = match self.inner.lock() {
            Ok(mut guard) => {
                let id = guard.next_id;
                guard.next_id += 1;
                guard.entries.push((id, Arc::new(listener)));
                id
            }
            Err(_) => return Subscription::empty(),
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Ok(mut guard) = inner.lock() {
                        guard.entries.retain(|(entry_id, _)| *entry_id != id);
                    }
                }
            })),
        }
    }

    /// Deliver `value` to every listener registered at the time of the call
    pub fn fire(&self, value: &T) {
        // Snapshot so listeners can subscribe/unsubscribe without deadlocking
        let snapshot: Vec<Listener<T>> = match self.inner.lock() {
            Ok(guard) => guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().map(|g| g.entries.len()).unwrap_or(0)
    }
}

/// Token for one registered listener
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// A token that owns nothing
    pub fn empty() -> Self {
        Self { remove: None }
    }

    pub fn dispose(mut self) {
        self.remove_now();
    }

    fn remove_now(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_each_subscriber_receives_events() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = Arc::clone(&a);
        let _sa = emitter.subscribe(move |v| {
            a2.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let b2 = Arc::clone(&b);
        let _sb = emitter.subscribe(move |v| {
            b2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        emitter.fire(&3);
        assert_eq!(a.load(Ordering::SeqCst), 3);
        assert_eq!(b.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dropping_token_removes_only_that_listener() {
        let emitter: EventEmitter<()> = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let first = emitter.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = Arc::clone(&hits);
        let _second = emitter.subscribe(move |_| {
            h2.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(emitter.listener_count(), 2);

        first.dispose();
        assert_eq!(emitter.listener_count(), 1);

        emitter.fire(&());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_subscription_outliving_emitter_is_harmless() {
        let emitter: EventEmitter<()> = EventEmitter::new();
        let sub = emitter.subscribe(|_| {});
        drop(emitter);
        drop(sub);
    }
}
