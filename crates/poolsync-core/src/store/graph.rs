// ── Pool entity graph ──
//
// Every per-kind collection of one pool, owned by the engine task.
// Readers never touch this type; they hold the `PoolStore` built from
// its `watch` receivers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::collection::EntityCollection;
use super::reconcile::ChangeSet;
use super::{CollectionSnapshot, PoolStore};
use crate::model::{Controller, ControllerClass, Element, ElementKind, EntityKind};

/// Raw lines of the last snapshot applied for one kind.
#[derive(Debug, Default)]
pub(crate) struct RawState {
    pub(crate) lines: HashSet<String>,
    pub(crate) malformed: HashSet<String>,
}

pub(crate) struct PoolGraph {
    pub(crate) classes: EntityCollection<ControllerClass>,
    pub(crate) controllers: EntityCollection<Controller>,
    pub(crate) communication_channels: EntityCollection<Element>,
    pub(crate) io_registers: EntityCollection<Element>,
    pub(crate) motors: EntityCollection<Element>,
    pub(crate) pseudo_motors: EntityCollection<Element>,
    pub(crate) experiment_channels: EntityCollection<Element>,
    pub(crate) pseudo_counters: EntityCollection<Element>,
    pub(crate) motor_groups: EntityCollection<Element>,
    pub(crate) measurement_groups: EntityCollection<Element>,
    pub(crate) raw: HashMap<EntityKind, RawState>,
    pub(crate) last_changes: HashMap<EntityKind, ChangeSet>,
}

impl PoolGraph {
    pub(crate) fn new() -> Self {
        Self {
            classes: EntityCollection::new(),
            controllers: EntityCollection::new(),
            communication_channels: EntityCollection::new(),
            io_registers: EntityCollection::new(),
            motors: EntityCollection::new(),
            pseudo_motors: EntityCollection::new(),
            experiment_channels: EntityCollection::new(),
            pseudo_counters: EntityCollection::new(),
            motor_groups: EntityCollection::new(),
            measurement_groups: EntityCollection::new(),
            raw: HashMap::new(),
            last_changes: HashMap::new(),
        }
    }

    /// Reader handle. Must be built before the graph moves into the engine.
    pub(crate) fn store(&self) -> PoolStore {
        PoolStore {
            classes: self.classes.subscribe(),
            controllers: self.controllers.subscribe(),
            communication_channels: self.communication_channels.subscribe(),
            io_registers: self.io_registers.subscribe(),
            motors: self.motors.subscribe(),
            pseudo_motors: self.pseudo_motors.subscribe(),
            experiment_channels: self.experiment_channels.subscribe(),
            pseudo_counters: self.pseudo_counters.subscribe(),
            motor_groups: self.motor_groups.subscribe(),
            measurement_groups: self.measurement_groups.subscribe(),
        }
    }

    // ── Collection access ────────────────────────────────────────────

    pub(crate) fn devices(&self, kind: EntityKind) -> Option<&EntityCollection<Element>> {
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

    pub(crate) fn devices_mut(&mut self, kind: EntityKind) -> Option<&mut EntityCollection<Element>> {
        match kind {
            EntityKind::ControllerClasses | EntityKind::Controllers => None,
            EntityKind::CommunicationChannels => Some(&mut self.communication_channels),
            EntityKind::IoRegisters => Some(&mut self.io_registers),
            EntityKind::Motors => Some(&mut self.motors),
            EntityKind::PseudoMotors => Some(&mut self.pseudo_motors),
            EntityKind::ExperimentChannels => Some(&mut self.experiment_channels),
            EntityKind::PseudoCounters => Some(&mut self.pseudo_counters),
            EntityKind::MotorGroups => Some(&mut self.motor_groups),
            EntityKind::MeasurementGroups => Some(&mut self.measurement_groups),
        }
    }

    /// Current identities of a collection, in order.
    pub(crate) fn identities(&self, kind: EntityKind) -> Vec<String> {
        let names: Vec<&str> = match kind {
            EntityKind::ControllerClasses => self.classes.names().collect(),
            EntityKind::Controllers => self.controllers.names().collect(),
            _ => self
                .devices(kind)
                .map(|c| c.names().collect())
                .unwrap_or_default(),
        };
        names.into_iter().map(str::to_owned).collect()
    }

    pub(crate) fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::ControllerClasses => self.classes.len(),
            EntityKind::Controllers => self.controllers.len(),
            _ => self.devices(kind).map_or(0, EntityCollection::len),
        }
    }

    /// Publish one collection. Returns its new version.
    pub(crate) fn publish(&mut self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::ControllerClasses => self.classes.publish(),
            EntityKind::Controllers => self.controllers.publish(),
            _ => self.devices_mut(kind).map_or(0, EntityCollection::publish),
        }
    }

    pub(crate) fn version(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::ControllerClasses => self.classes.version(),
            EntityKind::Controllers => self.controllers.version(),
            _ => self.devices(kind).map_or(0, EntityCollection::version),
        }
    }

    pub(crate) fn snapshot(&self, kind: EntityKind) -> CollectionSnapshot {
        match kind {
            EntityKind::ControllerClasses => CollectionSnapshot::Classes(self.classes.snapshot()),
            EntityKind::Controllers => CollectionSnapshot::Controllers(self.controllers.snapshot()),
            _ => CollectionSnapshot::Elements(
                self.devices(kind)
                    .map(EntityCollection::snapshot)
                    .unwrap_or_default(),
            ),
        }
    }

    /// Element of the given kind, by name.
    pub(crate) fn element(&self, kind: EntityKind, name: &str) -> Option<&Arc<Element>> {
        self.devices(kind)?.get(name)
    }

    // ── Shared pseudo counters ───────────────────────────────────────

    /// The collection that may hold the same pseudo-counter instance.
    pub(crate) fn sharing_partner(kind: EntityKind) -> Option<EntityKind> {
        match kind {
            EntityKind::ExperimentChannels => Some(EntityKind::PseudoCounters),
            EntityKind::PseudoCounters => Some(EntityKind::ExperimentChannels),
            _ => None,
        }
    }

    /// Existing pseudo counter a new line of `kind` should reuse.
    pub(crate) fn shared_instance(
        &self,
        kind: EntityKind,
        name: &str,
        element_kind: ElementKind,
    ) -> Option<Arc<Element>> {
        if element_kind != ElementKind::PseudoCounter {
            return None;
        }
        let partner = Self::sharing_partner(kind)?;
        self.element(partner, name)
            .filter(|e| e.kind() == ElementKind::PseudoCounter)
            .cloned()
    }

    /// `true` if a collection other than `kind` still holds `element`.
    pub(crate) fn held_elsewhere(&self, kind: EntityKind, element: &Element) -> bool {
        Self::sharing_partner(kind)
            .and_then(|partner| self.devices(partner))
            .is_some_and(|c| c.holds(element))
    }

    // ── Removal cascade ──────────────────────────────────────────────

    /// Detach a removed element from every collection referencing it,
    /// then clean it up. Shared instances still held elsewhere are kept.
    pub(crate) fn retire_element(&self, kind: EntityKind, element: &Arc<Element>) {
        if self.held_elsewhere(kind, element) {
            debug!(kind = %kind, name = element.name(), "element still held by another collection");
            return;
        }
        if let Some(ctrl) = element.controller() {
            ctrl.detach_element(element);
        }
        for composite in [
            &self.pseudo_motors,
            &self.pseudo_counters,
            &self.motor_groups,
            &self.measurement_groups,
        ] {
            for owner in composite.values() {
                if owner.detach_member(element) {
                    debug!(owner = owner.name(), member = element.name(), "detached removed member");
                }
            }
        }
        element.cleanup();
    }

    /// Orphan the elements of a removed controller, then clean it up.
    pub(crate) fn retire_controller(&self, controller: &Arc<Controller>) {
        for element in controller.elements() {
            element.set_controller(None);
        }
        controller.cleanup();
    }

    /// Invalidate controllers bound to a removed class, then clean it up.
    pub(crate) fn retire_class(&self, class: &Arc<ControllerClass>) {
        for ctrl in self.controllers.values() {
            if ctrl.class().is_some_and(|c| Arc::ptr_eq(&c, class)) {
                ctrl.set_class(None);
            }
        }
        class.cleanup();
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Clean up and drop every entity, publishing empty collections.
    pub(crate) fn teardown(&mut self) {
        for class in self.classes.drain() {
            class.cleanup();
        }
        for ctrl in self.controllers.drain() {
            ctrl.cleanup();
        }
        for kind in EntityKind::BOOTSTRAP_ORDER {
            if let Some(collection) = self.devices_mut(kind) {
                for element in collection.drain() {
                    element.cleanup();
                }
            }
        }
        for kind in EntityKind::BOOTSTRAP_ORDER {
            self.publish(kind);
        }
        self.raw.clear();
        self.last_changes.clear();
    }
}
