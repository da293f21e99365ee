// ── Collection readers ──
//
// Two ways to follow a collection. `EntityStream` reads the published
// `watch` snapshot and never talks to the engine; `fanout` delivers one
// `ChangeNotice` per effective reconcile to registered observers.

pub(crate) mod fanout;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use fanout::{ChangeNotice, ObserverId, Subscription};

use crate::model::{Controller, ControllerClass, Element};
use crate::store::Snapshot;

/// Entities that carry a collection-unique identity.
pub trait Identified {
    fn identity(&self) -> String;
}

impl Identified for ControllerClass {
    fn identity(&self) -> String {
        self.key()
    }
}

impl Identified for Controller {
    fn identity(&self) -> String {
        self.name().to_owned()
    }
}

impl Identified for Element {
    fn identity(&self) -> String {
        self.name().to_owned()
    }
}

/// Reader of one collection's published snapshots.
///
/// Publishes coalesce: a slow reader sees the newest contents, not
/// every intermediate one.
pub struct EntityStream<T: Send + Sync + 'static> {
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        Self { receiver }
    }

    /// Contents as currently published.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publish. `None` once the engine is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// First snapshot, current one included, that satisfies `ready`.
    pub async fn wait_until(&mut self, mut ready: impl FnMut(&[Arc<T>]) -> bool) -> Option<Snapshot<T>> {
        let snap = self.receiver.wait_for(|s| ready(s)).await.ok()?;
        Some(Arc::clone(&snap))
    }

    /// Current snapshot first, then one item per publish.
    pub fn into_stream(self) -> SnapshotStream<T> {
        SnapshotStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

impl<T: Identified + Send + Sync + 'static> EntityStream<T> {
    /// Wait until `name` is part of the collection.
    pub async fn wait_for(&mut self, name: &str) -> Option<Arc<T>> {
        let snap = self.wait_until(|s| s.iter().any(|e| e.identity() == name)).await?;
        snap.iter().find(|e| e.identity() == name).cloned()
    }
}

/// `Stream` over the published snapshots of one collection.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
