// ── Generic reactive entity collection ──
//
// Ordered, name-unique storage owned by the engine task, with
// push-based change notification via `watch` channels. Mutations are
// staged and only become visible to readers on `publish()`.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

/// Shared, immutable view of one collection.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// An ordered collection for a single entity type.
///
/// Uses an `IndexMap` so snapshot order follows the remote list, and a
/// `watch` channel for readers. Every publish bumps a version counter
/// and rebuilds the snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    /// Primary storage: identity -> entity.
    by_name: IndexMap<String, Arc<T>>,

    /// Version counter, bumped on every publish.
    version: u64,

    /// Full snapshot, rebuilt on publish for efficient subscription.
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_name: IndexMap::new(),
            version: 0,
            snapshot,
        }
    }

    /// Look up an entity by identity.
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.by_name.get(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// `true` if this exact instance is stored (pointer identity).
    pub(crate) fn holds(&self, entity: &T) -> bool {
        self.by_name
            .values()
            .any(|e| std::ptr::eq(Arc::as_ptr(e), entity))
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.by_name.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Stage a full replacement of the contents.
    pub(crate) fn replace(&mut self, entries: IndexMap<String, Arc<T>>) {
        self.by_name = entries;
    }

    /// Stage removal of every entity, returning them in order.
    pub(crate) fn drain(&mut self) -> Vec<Arc<T>> {
        self.by_name.drain(..).map(|(_, v)| v).collect()
    }

    /// Rebuild the snapshot and broadcast it. Returns the new version.
    pub(crate) fn publish(&mut self) -> u64 {
        let values: Vec<Arc<T>> = self.by_name.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version += 1;
        self.version
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Get the last published snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entries(items: &[(&str, &str)]) -> IndexMap<String, Arc<String>> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), Arc::new((*v).to_owned())))
            .collect()
    }

    #[test]
    fn staged_changes_are_invisible_until_publish() {
        let mut col: EntityCollection<String> = EntityCollection::new();
        let rx = col.subscribe();

        col.replace(entries(&[("a", "x"), ("b", "y")]));
        assert_eq!(col.len(), 2);
        assert!(col.snapshot().is_empty());
        assert!(!rx.has_changed().unwrap());

        assert_eq!(col.publish(), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(col.snapshot().len(), 2);
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let mut col: EntityCollection<String> = EntityCollection::new();
        col.replace(entries(&[("z", "1"), ("a", "2"), ("m", "3")]));
        col.publish();
        let names: Vec<&str> = col.names().collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(*col.snapshot()[0], "1");
    }

    #[test]
    fn holds_uses_pointer_identity() {
        let mut col: EntityCollection<String> = EntityCollection::new();
        col.replace(entries(&[("a", "x")]));
        let stored = Arc::clone(col.get("a").unwrap());
        let lookalike = Arc::new("x".to_owned());
        assert!(col.holds(&stored));
        assert!(!col.holds(&lookalike));
    }

    #[test]
    fn drain_empties_everything() {
        let mut col: EntityCollection<String> = EntityCollection::new();
        col.replace(entries(&[("a", "x"), ("b", "y")]));
        col.publish();

        let drained = col.drain();
        assert_eq!(drained.len(), 2);
        assert!(col.is_empty());
        col.publish();
        assert!(col.snapshot().is_empty());
        assert_eq!(col.version(), 2);
    }
}
