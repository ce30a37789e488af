//! Position update listeners

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Subscriber notified whenever a delivered message changed the local table.
///
/// Called synchronously on the delivery task; implementations must return
/// quickly and re-read the table through the service if they need the data.
pub trait PositionUpdateListener: Send + Sync {
    fn on_position_update(&self);
}

impl<F> PositionUpdateListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_position_update(&self) {
        self()
    }
}

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entries = Vec<(ListenerId, Arc<dyn PositionUpdateListener>)>;

/// Copy-on-write set of listeners.
///
/// Notification walks an immutable snapshot, so a listener may register or
/// unregister (itself included) from inside its own callback.
pub struct ListenerRegistry {
    entries: ArcSwap<Entries>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Add a listener
    pub fn register(&self, listener: Arc<dyn PositionUpdateListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.rcu(|entries| {
            let mut next = Entries::clone(entries);
            next.push((id, Arc::clone(&listener)));
            next
        });
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let previous = self.entries.rcu(|entries| {
            entries
                .iter()
                .filter(|(entry_id, _)| *entry_id != id)
                .cloned()
                .collect::<Entries>()
        });
        previous.iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Invoke every listener registered at the time of the call
    pub fn notify(&self) {
        let snapshot = self.entries.load_full();
        for (_, listener) in snapshot.iter() {
            listener.on_position_update();
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
