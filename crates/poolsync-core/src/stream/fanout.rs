// ── Change notification fanout ──
//
// Independent observer lists per entity kind. Every effective
// reconcile delivers exactly one `ChangeNotice` to each observer of
// that kind. Observers whose receiver was dropped are pruned lazily.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::model::EntityKind;
use crate::store::CollectionSnapshot;

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// "This collection was replaced": the new contents, not a delta.
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub kind: EntityKind,
    /// Collection version after the change.
    pub version: u64,
    pub snapshot: CollectionSnapshot,
}

/// Receiving end of one observer registration.
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    kind: EntityKind,
    receiver: mpsc::UnboundedReceiver<ChangeNotice>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Next notice, or `None` once the registration is gone.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.recv().await
    }

    /// Next notice if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
pub(crate) struct Fanout {
    next_id: u64,
    observers: HashMap<EntityKind, IndexMap<ObserverId, mpsc::UnboundedSender<ChangeNotice>>>,
}

impl Fanout {
    pub(crate) fn register(&mut self, kind: EntityKind) -> Subscription {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        let (tx, receiver) = mpsc::unbounded_channel();
        self.observers.entry(kind).or_default().insert(id, tx);
        Subscription { id, kind, receiver }
    }

    /// Returns `true` if the observer was registered.
    pub(crate) fn unregister(&mut self, id: ObserverId) -> bool {
        self.observers
            .values_mut()
            .any(|list| list.shift_remove(&id).is_some())
    }

    /// Deliver one notice to every observer of `notice.kind`.
    /// Returns the number of observers reached.
    pub(crate) fn notify(&mut self, notice: &ChangeNotice) -> usize {
        let Some(list) = self.observers.get_mut(&notice.kind) else {
            return 0;
        };
        list.retain(|id, tx| {
            let alive = tx.send(notice.clone()).is_ok();
            if !alive {
                trace!(observer = %id, kind = %notice.kind, "pruning closed observer");
            }
            alive
        });
        list.len()
    }

    pub(crate) fn observer_count(&self, kind: EntityKind) -> usize {
        self.observers.get(&kind).map_or(0, IndexMap::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.observers.values().map(IndexMap::len).sum()
    }

    /// Drop every registration; pending receivers see end-of-stream.
    pub(crate) fn clear(&mut self) {
        self.observers.clear();
    }
}
