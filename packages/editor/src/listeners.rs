//! Observer registry shared by the snapshot store and selection registries.
//!
//! Dropping a [`Subscription`] detaches its listener. A listener detached
//! before a notification begins is never called by it, which is how an
//! unmounted panel stops receiving results of fetches still in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<E>,
}

struct Registry<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<E>>>,
}

impl<E> Registry<E> {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry<E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|entry| entry.id != id);
    }
}

pub struct Listeners<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Listeners<E> {
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.registry.entries().push(Entry {
            id,
            active: active.clone(),
            callback: Arc::new(listener),
        });

        let registry: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            active,
            detach: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(id);
                }
            })),
        }
    }

    /// Deliver `event` to every listener attached when the call starts
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe re-entrantly.
    pub fn notify(&self, event: &E) {
        let targets: Vec<(Arc<AtomicBool>, Callback<E>)> = self
            .registry
            .entries()
            .iter()
            .map(|entry| (entry.active.clone(), entry.callback.clone()))
            .collect();

        for (active, callback) in targets {
            if active.load(Ordering::Acquire) {
                callback(event);
            }
        }
    }
}

/// Handle to one attached listener
#[must_use = "dropping a Subscription detaches the listener"]
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn detach_now(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
