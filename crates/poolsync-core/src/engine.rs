// ── Synchronization engine ──
//
// Single writer of the pool graph. Every reconciliation, teardown and
// observer (de)registration is a message processed in arrival order,
// so no collection is ever mutated from two places at once. Remote
// reads happen before a message is sent; the engine only merges.

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::CoreError;
use crate::model::{ClassInfo, EntityKind, MeasurementSettings, PropertyValue};
use crate::resolve;
use crate::store::graph::PoolGraph;
use crate::store::{ChangeSet, DiscardReason, PoolStore, ReconcileOutcome};
use crate::stream::fanout::Fanout;
use crate::stream::{ChangeNotice, ObserverId, Subscription};

const ENGINE_CHANNEL_SIZE: usize = 256;

/// Point-in-time view of the engine's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub available: bool,
    pub epoch: u64,
    /// Entity count per collection, in bootstrap order.
    pub entities: IndexMap<EntityKind, usize>,
    /// Registered observers per collection, in bootstrap order.
    pub observers: IndexMap<EntityKind, usize>,
}

impl EngineStatus {
    pub fn total_entities(&self) -> usize {
        self.entities.values().sum()
    }

    pub fn total_observers(&self) -> usize {
        self.observers.values().sum()
    }
}

pub(crate) enum EngineMessage {
    Activate {
        epoch: u64,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        epoch: u64,
        kind: EntityKind,
        lines: Vec<String>,
        /// Notify observers even if the identity set did not change.
        force_notify: bool,
        reply: oneshot::Sender<ReconcileOutcome>,
    },
    /// Metadata replies carry whether the target entity was updated.
    ClassInfo {
        epoch: u64,
        key: String,
        info: ClassInfo,
        reply: oneshot::Sender<bool>,
    },
    ControllerProperties {
        epoch: u64,
        name: String,
        properties: Vec<PropertyValue>,
        reply: oneshot::Sender<bool>,
    },
    MeasurementSettings {
        epoch: u64,
        name: String,
        settings: MeasurementSettings,
        reply: oneshot::Sender<bool>,
    },
    Subscribe {
        kind: EntityKind,
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        id: ObserverId,
        reply: oneshot::Sender<bool>,
    },
    LastChanges {
        kind: EntityKind,
        reply: oneshot::Sender<Option<ChangeSet>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

// ── Handle ──────────────────────────────────────────────────────────

/// Sending side of the engine mailbox.
#[derive(Clone)]
pub(crate) struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    async fn send(&self, message: EngineMessage) -> Result<(), CoreError> {
        self.tx.send(message).await.map_err(|_| CoreError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineMessage) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| CoreError::EngineStopped)
    }

    pub(crate) async fn activate(&self, epoch: u64) -> Result<(), CoreError> {
        self.send(EngineMessage::Activate { epoch }).await
    }

    pub(crate) async fn teardown(&self) -> Result<(), CoreError> {
        self.request(|reply| EngineMessage::Teardown { reply }).await
    }

    pub(crate) async fn snapshot(
        &self,
        epoch: u64,
        kind: EntityKind,
        lines: Vec<String>,
        force_notify: bool,
    ) -> Result<ReconcileOutcome, CoreError> {
        self.request(|reply| EngineMessage::Snapshot {
            epoch,
            kind,
            lines,
            force_notify,
            reply,
        })
        .await
    }

    /// Attach class metadata; resolves once the engine has applied it.
    pub(crate) async fn class_info(&self, epoch: u64, key: String, info: ClassInfo) -> Result<bool, CoreError> {
        self.request(|reply| EngineMessage::ClassInfo { epoch, key, info, reply })
            .await
    }

    pub(crate) async fn controller_properties(
        &self,
        epoch: u64,
        name: String,
        properties: Vec<PropertyValue>,
    ) -> Result<bool, CoreError> {
        self.request(|reply| EngineMessage::ControllerProperties {
            epoch,
            name,
            properties,
            reply,
        })
        .await
    }

    pub(crate) async fn measurement_settings(
        &self,
        epoch: u64,
        name: String,
        settings: MeasurementSettings,
    ) -> Result<bool, CoreError> {
        self.request(|reply| EngineMessage::MeasurementSettings {
            epoch,
            name,
            settings,
            reply,
        })
        .await
    }

    pub(crate) async fn subscribe(&self, kind: EntityKind) -> Result<Subscription, CoreError> {
        self.request(|reply| EngineMessage::Subscribe { kind, reply }).await
    }

    pub(crate) async fn unsubscribe(&self, id: ObserverId) -> Result<bool, CoreError> {
        self.request(|reply| EngineMessage::Unsubscribe { id, reply }).await
    }

    pub(crate) async fn last_changes(&self, kind: EntityKind) -> Result<Option<ChangeSet>, CoreError> {
        self.request(|reply| EngineMessage::LastChanges { kind, reply }).await
    }

    pub(crate) async fn status(&self) -> Result<EngineStatus, CoreError> {
        self.request(|reply| EngineMessage::Status { reply }).await
    }
}

// ── Engine task ─────────────────────────────────────────────────────

struct Engine {
    pool: String,
    graph: PoolGraph,
    fanout: Fanout,
    available: bool,
    epoch: u64,
}

/// Start the engine task. It runs until every handle is dropped.
pub(crate) fn spawn(pool: String) -> (EngineHandle, PoolStore, JoinHandle<()>) {
    let graph = PoolGraph::new();
    let store = graph.store();
    let (tx, rx) = mpsc::channel(ENGINE_CHANNEL_SIZE);
    let engine = Engine {
        pool,
        graph,
        fanout: Fanout::default(),
        available: false,
        epoch: 0,
    };
    let handle = tokio::spawn(engine.run(rx));
    (EngineHandle { tx }, store, handle)
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<EngineMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        self.graph.teardown();
        self.fanout.clear();
        debug!(pool = %self.pool, "engine stopped");
    }

    fn handle(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Activate { epoch } => {
                self.epoch = epoch;
                self.available = true;
                debug!(pool = %self.pool, epoch, "engine accepting snapshots");
            }
            EngineMessage::Teardown { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
            EngineMessage::Snapshot {
                epoch,
                kind,
                lines,
                force_notify,
                reply,
            } => {
                let outcome = self.apply_snapshot(epoch, kind, &lines, force_notify);
                let _ = reply.send(outcome);
            }
            EngineMessage::ClassInfo { epoch, key, info, reply } => {
                let applied = self.accepts(epoch)
                    && match self.graph.classes.get(&key) {
                        Some(class) => {
                            class.set_info(info);
                            true
                        }
                        None => {
                            trace!(class = %key, "class info for unknown class");
                            false
                        }
                    };
                let _ = reply.send(applied);
            }
            EngineMessage::ControllerProperties {
                epoch,
                name,
                properties,
                reply,
            } => {
                let applied = self.accepts(epoch)
                    && match self.graph.controllers.get(&name) {
                        Some(ctrl) => {
                            ctrl.set_properties(properties);
                            true
                        }
                        None => {
                            trace!(controller = %name, "properties for unknown controller");
                            false
                        }
                    };
                let _ = reply.send(applied);
            }
            EngineMessage::MeasurementSettings {
                epoch,
                name,
                settings,
                reply,
            } => {
                let applied = self.accepts(epoch)
                    && match self.graph.measurement_groups.get(&name) {
                        Some(group) => {
                            group.set_settings(Some(resolve::validate_settings(group, settings)));
                            true
                        }
                        None => {
                            trace!(group = %name, "settings for unknown measurement group");
                            false
                        }
                    };
                let _ = reply.send(applied);
            }
            EngineMessage::Subscribe { kind, reply } => {
                let _ = reply.send(self.fanout.register(kind));
            }
            EngineMessage::Unsubscribe { id, reply } => {
                let _ = reply.send(self.fanout.unregister(id));
            }
            EngineMessage::LastChanges { kind, reply } => {
                let _ = reply.send(self.graph.last_changes.get(&kind).cloned());
            }
            EngineMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn accepts(&self, epoch: u64) -> bool {
        self.available && epoch == self.epoch
    }

    fn apply_snapshot(
        &mut self,
        epoch: u64,
        kind: EntityKind,
        lines: &[String],
        force_notify: bool,
    ) -> ReconcileOutcome {
        if !self.available {
            debug!(pool = %self.pool, kind = %kind, "discarding snapshot while unavailable");
            return ReconcileOutcome::Discarded(DiscardReason::Unavailable);
        }
        if epoch != self.epoch {
            debug!(pool = %self.pool, kind = %kind, epoch, current = self.epoch, "discarding stale snapshot");
            return ReconcileOutcome::Discarded(DiscardReason::StaleEpoch {
                epoch,
                current: self.epoch,
            });
        }

        let outcome = self.graph.reconcile(kind, lines);
        if outcome.is_applied() || force_notify {
            self.notify(kind);
        }
        outcome
    }

    fn notify(&mut self, kind: EntityKind) {
        let notice = ChangeNotice {
            kind,
            version: self.graph.version(kind),
            snapshot: self.graph.snapshot(kind),
        };
        let reached = self.fanout.notify(&notice);
        trace!(kind = %kind, version = notice.version, reached, "change notice delivered");
    }

    fn teardown(&mut self) {
        let entities: usize = EntityKind::BOOTSTRAP_ORDER
            .into_iter()
            .map(|k| self.graph.len(k))
            .sum();
        let observers = self.fanout.total();
        self.available = false;
        self.graph.teardown();
        self.fanout.clear();
        info!(pool = %self.pool, entities, observers, "pool graph torn down");
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            available: self.available,
            epoch: self.epoch,
            entities: EntityKind::BOOTSTRAP_ORDER
                .into_iter()
                .map(|k| (k, self.graph.len(k)))
                .collect(),
            observers: EntityKind::BOOTSTRAP_ORDER
                .into_iter()
                .map(|k| (k, self.fanout.observer_count(k)))
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CLASS: &str = "IcepapCtrl (/opt/pool/ctrls/icepap.py) Motor";
    const CTRL: &str = "ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)";
    const MOT1: &str = "mot1 (motor/ctrl1/1) (ctrl1/1)";

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn snapshots_before_activation_are_discarded() {
        let (engine, store, _task) = spawn("pool".into());
        let outcome = engine.snapshot(0, EntityKind::Motors, lines(&[MOT1]), false).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Discarded(DiscardReason::Unavailable));
        assert!(store.elements_snapshot(EntityKind::Motors).is_empty());
    }

    #[tokio::test]
    async fn stale_epoch_is_discarded() {
        let (engine, _store, _task) = spawn("pool".into());
        engine.activate(2).await.unwrap();
        let outcome = engine.snapshot(1, EntityKind::Motors, lines(&[MOT1]), false).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Discarded(DiscardReason::StaleEpoch { epoch: 1, current: 2 })
        );
    }

    #[tokio::test]
    async fn forced_notice_fires_without_identity_change() {
        let (engine, _store, _task) = spawn("pool".into());
        engine.activate(1).await.unwrap();
        let mut sub = engine.subscribe(EntityKind::Controllers).await.unwrap();

        engine.snapshot(1, EntityKind::Controllers, lines(&[CTRL]), false).await.unwrap();
        assert_eq!(sub.try_recv().unwrap().snapshot.len(), 1);

        let outcome = engine.snapshot(1, EntityKind::Controllers, lines(&[CTRL]), false).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert!(sub.try_recv().is_none());

        engine.snapshot(1, EntityKind::Controllers, lines(&[CTRL]), true).await.unwrap();
        assert_eq!(sub.try_recv().unwrap().snapshot.names(), vec!["ctrl1"]);
    }

    #[tokio::test]
    async fn metadata_is_visible_once_acknowledged() {
        let (engine, store, _task) = spawn("pool".into());
        engine.activate(1).await.unwrap();
        engine
            .snapshot(1, EntityKind::ControllerClasses, lines(&[CLASS]), false)
            .await
            .unwrap();
        engine.snapshot(1, EntityKind::Controllers, lines(&[CTRL]), false).await.unwrap();

        let info = ClassInfo {
            description: "IcePAP motor controller".into(),
            ..ClassInfo::default()
        };
        assert!(engine.class_info(1, "icepap.py/IcepapCtrl".into(), info).await.unwrap());
        assert_eq!(
            store.class_by_file("icepap.py", "IcepapCtrl").unwrap().info().description,
            "IcePAP motor controller"
        );

        let host = vec![PropertyValue {
            name: "Host".into(),
            declared_type: "PyTango.DevString".into(),
            description: "IcePAP host".into(),
            value: "icepap02".into(),
        }];
        assert!(engine.controller_properties(1, "ctrl1".into(), host).await.unwrap());
        assert_eq!(store.controller("ctrl1").unwrap().property_value("Host").as_deref(), Some("icepap02"));
    }

    #[tokio::test]
    async fn metadata_for_unknown_or_stale_targets_is_not_applied() {
        let (engine, store, _task) = spawn("pool".into());
        engine.activate(2).await.unwrap();
        engine.snapshot(2, EntityKind::Controllers, lines(&[CTRL]), false).await.unwrap();

        let host = vec![PropertyValue {
            name: "Host".into(),
            declared_type: "PyTango.DevString".into(),
            description: "IcePAP host".into(),
            value: "icepap02".into(),
        }];
        assert!(!engine.controller_properties(1, "ctrl1".into(), host.clone()).await.unwrap());
        assert!(!engine.controller_properties(2, "ctrl9".into(), host).await.unwrap());
        assert!(
            !engine
                .measurement_settings(2, "mnt".into(), MeasurementSettings::default())
                .await
                .unwrap()
        );
        assert!(store.controller("ctrl1").unwrap().properties().is_empty());
    }

    #[tokio::test]
    async fn teardown_clears_graph_and_observers() {
        let (engine, store, _task) = spawn("pool".into());
        engine.activate(1).await.unwrap();
        let mut sub = engine.subscribe(EntityKind::Motors).await.unwrap();
        engine.snapshot(1, EntityKind::Controllers, lines(&[CTRL]), false).await.unwrap();
        engine.snapshot(1, EntityKind::Motors, lines(&[MOT1]), false).await.unwrap();
        assert!(sub.recv().await.is_some());

        engine.teardown().await.unwrap();
        let status = engine.status().await.unwrap();
        assert!(!status.available);
        assert_eq!(status.total_entities(), 0);
        assert_eq!(status.total_observers(), 0);
        assert!(store.controllers_snapshot().is_empty());
        assert!(sub.recv().await.is_none());
    }
}
