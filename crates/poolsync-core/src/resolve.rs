// ── Cross-reference resolution ──
//
// Binds textual references (controller names, class keys, member
// names) to live entities. Unknown targets are left unbound and picked
// up by the re-resolution pass that follows the next reconcile of the
// referenced kind.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::{Controller, Element, ElementKind, EntityKind, MeasurementSettings};
use crate::store::graph::PoolGraph;

/// Collections searched, in order, for the members of each composite kind.
fn member_sources(kind: ElementKind) -> &'static [EntityKind] {
    match kind {
        ElementKind::MotorGroup => &[EntityKind::Motors, EntityKind::MotorGroups, EntityKind::PseudoMotors],
        ElementKind::PseudoMotor => &[EntityKind::Motors, EntityKind::PseudoMotors],
        ElementKind::PseudoCounter => &[EntityKind::ExperimentChannels, EntityKind::PseudoCounters],
        ElementKind::MeasurementGroup => &[EntityKind::ExperimentChannels, EntityKind::PseudoCounters],
        _ => &[],
    }
}

// ── Controllers and classes ─────────────────────────────────────────

/// Controller an element belongs to, by exact name.
pub(crate) fn owning_controller(graph: &PoolGraph, element: &Element) -> Option<Arc<Controller>> {
    let name = element.controller_name()?;
    let found = graph.controllers.get(name).cloned();
    if found.is_none() {
        info!(element = element.name(), controller = name, "controller not known yet, binding deferred");
    }
    found
}

/// Bind every controller to its class; unknown classes leave it `Invalid`.
pub(crate) fn bind_controller_classes(graph: &PoolGraph) {
    for ctrl in graph.controllers.values() {
        let key = ctrl.class_key();
        let class = graph.classes.get(&key).cloned();
        let changed = match (ctrl.class(), &class) {
            (Some(old), Some(new)) => !Arc::ptr_eq(&old, new),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            continue;
        }
        if class.is_none() {
            info!(controller = ctrl.name(), class = %key, "controller class not known yet");
        }
        ctrl.set_class(class);
    }
}

/// Re-derive every element's controller and rebuild every controller's
/// element list from scratch, in kind order then collection order.
pub(crate) fn rebuild_controller_elements(graph: &PoolGraph) {
    let mut owned: Vec<(String, Arc<Element>)> = Vec::new();

    for kind in EntityKind::BOOTSTRAP_ORDER.into_iter().filter(|k| k.is_controller_owned()) {
        let Some(collection) = graph.devices(kind) else {
            continue;
        };
        for element in collection.values() {
            let controller = owning_controller(graph, element);
            element.set_controller(controller.as_ref());
            if let Some(ctrl) = controller {
                // A shared pseudo counter shows up in two collections.
                if !owned.iter().any(|(_, e)| Arc::ptr_eq(e, element)) {
                    owned.push((ctrl.name().to_owned(), Arc::clone(element)));
                }
            }
        }
    }

    for ctrl in graph.controllers.values() {
        let elements: Vec<Arc<Element>> = owned
            .iter()
            .filter(|(name, _)| name == ctrl.name())
            .map(|(_, e)| Arc::clone(e))
            .collect();
        ctrl.set_elements(elements);
    }
}

// ── Composite members ───────────────────────────────────────────────

fn lookup_member(graph: &PoolGraph, kind: ElementKind, name: &str) -> Option<Arc<Element>> {
    member_sources(kind)
        .iter()
        .find_map(|source| graph.element(*source, name).cloned())
}

/// Resolve the declared members of one composite element.
///
/// Unknown names are dropped with a warning. A member that is the
/// element itself, or that transitively contains it, is rejected.
pub(crate) fn resolve_members(graph: &PoolGraph, owner: &Arc<Element>) {
    if member_sources(owner.kind()).is_empty() {
        return;
    }
    let mut members = Vec::new();
    for name in owner.declared_members() {
        let Some(member) = lookup_member(graph, owner.kind(), &name) else {
            warn!(owner = owner.name(), member = %name, "unresolved member dropped");
            continue;
        };
        if Arc::ptr_eq(&member, owner) || member.contains(owner) {
            warn!(owner = owner.name(), member = %name, "cyclic membership rejected");
            continue;
        }
        if members.iter().any(|m: &Arc<Element>| Arc::ptr_eq(m, &member)) {
            debug!(owner = owner.name(), member = %name, "duplicate member ignored");
            continue;
        }
        members.push(member);
    }
    owner.set_members(members);
}

/// Re-resolve every composite in the given collections.
pub(crate) fn resolve_members_of(graph: &PoolGraph, kinds: &[EntityKind]) {
    for kind in kinds {
        if let Some(collection) = graph.devices(*kind) {
            for owner in collection.values() {
                resolve_members(graph, owner);
            }
        }
    }
}

// ── Measurement group settings ──────────────────────────────────────

/// Keep timer and monitor only if they name member channels.
pub(crate) fn validate_settings(group: &Element, mut settings: MeasurementSettings) -> MeasurementSettings {
    let members = group.member_names();
    for (role, slot) in [("timer", &mut settings.timer), ("monitor", &mut settings.monitor)] {
        if let Some(channel) = slot.as_deref() {
            if !members.iter().any(|m| m == channel) {
                warn!(group = group.name(), role, channel, "channel is not a member of the group");
                *slot = None;
            }
        }
    }
    settings
}

/// Re-check every group's settings against its current channels.
pub(crate) fn revalidate_settings(graph: &PoolGraph) {
    for group in graph.measurement_groups.values() {
        if let Some(settings) = group.settings() {
            let checked = validate_settings(group, MeasurementSettings::clone(&settings));
            if checked != *settings {
                group.set_settings(Some(checked));
            }
        }
    }
}

// ── Pass dispatch ───────────────────────────────────────────────────

/// Run the re-resolution passes that depend on `kind`.
pub(crate) fn after_reconcile(graph: &PoolGraph, kind: EntityKind) {
    match kind {
        EntityKind::ControllerClasses => bind_controller_classes(graph),
        EntityKind::Controllers => {
            bind_controller_classes(graph);
            rebuild_controller_elements(graph);
        }
        EntityKind::CommunicationChannels | EntityKind::IoRegisters => {
            rebuild_controller_elements(graph);
        }
        EntityKind::Motors | EntityKind::PseudoMotors => {
            rebuild_controller_elements(graph);
            resolve_members_of(graph, &[EntityKind::PseudoMotors, EntityKind::MotorGroups]);
        }
        EntityKind::MotorGroups => {
            resolve_members_of(graph, &[EntityKind::MotorGroups]);
        }
        EntityKind::ExperimentChannels | EntityKind::PseudoCounters => {
            rebuild_controller_elements(graph);
            resolve_members_of(graph, &[EntityKind::PseudoCounters, EntityKind::MeasurementGroups]);
            revalidate_settings(graph);
        }
        EntityKind::MeasurementGroups => {
            resolve_members_of(graph, &[EntityKind::MeasurementGroups]);
            revalidate_settings(graph);
        }
    }
}
