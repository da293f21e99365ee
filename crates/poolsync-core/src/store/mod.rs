// ── Reactive pool store ──
//
// The engine owns the `PoolGraph`; everyone else reads through
// `PoolStore`, a bundle of `watch` receivers that never blocks the
// writer.

mod collection;
pub(crate) mod graph;
pub(crate) mod reconcile;

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

pub use collection::Snapshot;
pub use reconcile::{ChangeSet, DiscardReason, ReconcileOutcome};

use crate::model::{Controller, ControllerClass, ControllerType, Element, ElementKind, EntityKind, class_key};
use crate::stream::EntityStream;

// ── CollectionSnapshot ──────────────────────────────────────────────

/// Published contents of one collection, whatever its entity type.
#[derive(Debug, Clone)]
pub enum CollectionSnapshot {
    Classes(Snapshot<ControllerClass>),
    Controllers(Snapshot<Controller>),
    Elements(Snapshot<Element>),
}

impl CollectionSnapshot {
    pub fn len(&self) -> usize {
        match self {
            Self::Classes(s) => s.len(),
            Self::Controllers(s) => s.len(),
            Self::Elements(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities in collection order.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Classes(s) => s.iter().map(|c| c.key()).collect(),
            Self::Controllers(s) => s.iter().map(|c| c.name().to_owned()).collect(),
            Self::Elements(s) => s.iter().map(|e| e.name().to_owned()).collect(),
        }
    }
}

// ── PoolStore ───────────────────────────────────────────────────────

/// Lock-free read access to every collection of one pool.
#[derive(Clone)]
pub struct PoolStore {
    pub(crate) classes: watch::Receiver<Snapshot<ControllerClass>>,
    pub(crate) controllers: watch::Receiver<Snapshot<Controller>>,
    pub(crate) communication_channels: watch::Receiver<Snapshot<Element>>,
    pub(crate) io_registers: watch::Receiver<Snapshot<Element>>,
    pub(crate) motors: watch::Receiver<Snapshot<Element>>,
    pub(crate) pseudo_motors: watch::Receiver<Snapshot<Element>>,
    pub(crate) experiment_channels: watch::Receiver<Snapshot<Element>>,
    pub(crate) pseudo_counters: watch::Receiver<Snapshot<Element>>,
    pub(crate) motor_groups: watch::Receiver<Snapshot<Element>>,
    pub(crate) measurement_groups: watch::Receiver<Snapshot<Element>>,
}

impl PoolStore {
    fn device_receiver(&self, kind: EntityKind) -> Option<&watch::Receiver<Snapshot<Element>>> {
        match kind {
            EntityKind::ControllerClasses | EntityKind::Controllers => None,
            EntityKind::CommunicationChannels => Some(&self.communication_channels),
            EntityKind::IoRegisters => Some(&self.io_registers),
            EntityKind::Motors => Some(&self.motors),
            EntityKind::PseudoMotors => Some(&self.pseudo_motors),
            EntityKind::ExperimentChannels => Some(&self.experiment_channels),
            EntityKind::PseudoCounters => Some(&self.pseudo_counters),
            EntityKind::MotorGroups => Some(&self.motor_groups),
            EntityKind::MeasurementGroups => Some(&self.measurement_groups),
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn snapshot(&self, kind: EntityKind) -> CollectionSnapshot {
        match kind {
            EntityKind::ControllerClasses => CollectionSnapshot::Classes(self.classes_snapshot()),
            EntityKind::Controllers => CollectionSnapshot::Controllers(self.controllers_snapshot()),
            _ => CollectionSnapshot::Elements(self.elements_snapshot(kind)),
        }
    }

    pub fn classes_snapshot(&self) -> Snapshot<ControllerClass> {
        self.classes.borrow().clone()
    }

    pub fn controllers_snapshot(&self) -> Snapshot<Controller> {
        self.controllers.borrow().clone()
    }

    /// Elements of one device collection; empty for non-device kinds.
    pub fn elements_snapshot(&self, kind: EntityKind) -> Snapshot<Element> {
        self.device_receiver(kind)
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default()
    }

    // ── Streams ──────────────────────────────────────────────────────

    pub fn classes(&self) -> EntityStream<ControllerClass> {
        EntityStream::new(self.classes.clone())
    }

    pub fn controllers(&self) -> EntityStream<Controller> {
        EntityStream::new(self.controllers.clone())
    }

    /// Stream of one device collection. `None` for non-device kinds.
    pub fn elements(&self, kind: EntityKind) -> Option<EntityStream<Element>> {
        self.device_receiver(kind).map(|rx| EntityStream::new(rx.clone()))
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn controller(&self, name: &str) -> Option<Arc<Controller>> {
        self.controllers.borrow().iter().find(|c| c.name() == name).cloned()
    }

    pub fn element(&self, kind: EntityKind, name: &str) -> Option<Arc<Element>> {
        self.device_receiver(kind)?
            .borrow()
            .iter()
            .find(|e| e.name() == name)
            .cloned()
    }

    /// First device with this name, searching every device collection.
    pub fn find_element(&self, name: &str) -> Option<Arc<Element>> {
        EntityKind::BOOTSTRAP_ORDER
            .into_iter()
            .filter(|k| k.holds_elements())
            .find_map(|kind| self.element(kind, name))
    }

    /// Controllers whose class lives in `library`.
    pub fn controllers_in_library(&self, library: &str) -> Vec<Arc<Controller>> {
        self.controllers
            .borrow()
            .iter()
            .filter(|c| c.library() == library)
            .cloned()
            .collect()
    }

    /// Total number of elements owned by controllers.
    pub fn controller_element_count(&self) -> usize {
        self.controllers.borrow().iter().map(|c| c.element_count()).sum()
    }

    /// Experiment channels of one subtype.
    pub fn experiment_channels_of(&self, subtype: ElementKind) -> Vec<Arc<Element>> {
        self.experiment_channels
            .borrow()
            .iter()
            .filter(|e| e.kind() == subtype)
            .cloned()
            .collect()
    }

    // ── Class catalogue ──────────────────────────────────────────────

    /// Class by library file name and class name.
    pub fn class_by_file(&self, file_name: &str, class_name: &str) -> Option<Arc<ControllerClass>> {
        let key = class_key(file_name, class_name);
        self.classes.borrow().iter().find(|c| c.key() == key).cloned()
    }

    /// Class by type, library file name and class name.
    pub fn class(
        &self,
        controller_type: ControllerType,
        file_name: &str,
        class_name: &str,
    ) -> Option<Arc<ControllerClass>> {
        self.class_by_file(file_name, class_name)
            .filter(|c| c.controller_type() == controller_type)
    }

    /// Class by `module.Class`, trying the C++ library first, then Python.
    pub fn class_by_qualified_name(&self, qualified: &str) -> Option<Arc<ControllerClass>> {
        let (module, class_name) = qualified.split_once('.')?;
        ["la", "py"]
            .into_iter()
            .find_map(|ext| self.class_by_file(&format!("{module}.{ext}"), class_name))
    }

    /// Classes grouped by controller type, in catalogue order.
    pub fn classes_by_type(&self) -> IndexMap<ControllerType, Vec<Arc<ControllerClass>>> {
        let mut out: IndexMap<ControllerType, Vec<Arc<ControllerClass>>> = IndexMap::new();
        for class in self.classes.borrow().iter() {
            out.entry(class.controller_type()).or_default().push(Arc::clone(class));
        }
        out
    }

    /// Classes grouped by library file name, in catalogue order.
    pub fn classes_by_module(&self) -> IndexMap<String, Vec<Arc<ControllerClass>>> {
        let mut out: IndexMap<String, Vec<Arc<ControllerClass>>> = IndexMap::new();
        for class in self.classes.borrow().iter() {
            out.entry(class.module().file_name.clone())
                .or_default()
                .push(Arc::clone(class));
        }
        out
    }
}
