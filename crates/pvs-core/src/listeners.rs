// ── Per-field listener registry ──
//
// Consumers register interest in individual live-data fields and are
// called only when that field changes. Registrations are disposable:
// `subscribe` hands back a `Subscription` that removes exactly the
// registration it came from.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A change callback. Invoked with no arguments; read the new value
/// through the coordinator.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

struct Listener {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    buckets: DashMap<String, Vec<Listener>>,
    next_id: AtomicU64,
}

/// Field name → ordered listeners.
///
/// Cheaply cloneable; clones share the same registrations.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for changes to `field`.
    pub fn subscribe(
        &self,
        field: impl Into<String>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let field = field.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .buckets
            .entry(field.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });

        Subscription {
            registry: Arc::downgrade(&self.inner),
            field,
            id,
        }
    }

    /// Invoke every listener registered for each field in `fields`.
    ///
    /// Within a field, listeners run in registration order. Callbacks run
    /// after all registry locks are released, so they may subscribe or
    /// unsubscribe freely.
    pub fn notify<S: AsRef<str>>(&self, fields: &BTreeSet<S>) {
        let callbacks: Vec<Callback> = fields
            .iter()
            .filter_map(|field| self.inner.buckets.get(field.as_ref()))
            .flat_map(|bucket| {
                bucket
                    .iter()
                    .map(|l| Arc::clone(&l.callback))
                    .collect::<Vec<_>>()
            })
            .collect();

        for callback in callbacks {
            callback();
        }
    }

    /// Number of listeners registered for `field`.
    pub fn listener_count(&self, field: &str) -> usize {
        self.inner.buckets.get(field).map_or(0, |b| b.len())
    }

    /// Whether `field` has a bucket at all.
    pub fn has_field(&self, field: &str) -> bool {
        self.inner.buckets.contains_key(field)
    }
}

/// Handle to one registration.
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "dropping a Subscription keeps the listener registered forever"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    field: String,
    id: u64,
}

impl Subscription {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Remove this registration. A no-op if the registry is gone.
    pub fn unsubscribe(self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        if let Entry::Occupied(mut bucket) = inner.buckets.entry(self.field) {
            bucket.get_mut().retain(|l| l.id != self.id);
            if bucket.get().is_empty() {
                bucket.remove();
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("field", &self.field)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
