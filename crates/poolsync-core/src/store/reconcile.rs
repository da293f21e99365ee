// ── Snapshot reconciliation ──
//
// Diffs a freshly received snapshot against the current collection.
// Entities present in both are kept by reference; only additions and
// removals mutate the graph and only they trigger a notification.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::graph::{PoolGraph, RawState};
use crate::codec::{
    ClassDescriptor, ControllerDescriptor, DecodedSnapshot, Descriptor, ElementDescriptor,
    decode_line, decode_snapshot, extract_name,
};
use crate::model::{Controller, ControllerClass, Element, EntityKind};
use crate::resolve;

/// What one reconciliation did to one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Kept entities whose remote payload no longer matches.
    pub drifted: Vec<String>,
    /// Lines of the snapshot that failed to decode.
    pub malformed: usize,
}

impl ChangeSet {
    /// `true` if the identity set changed.
    pub fn is_effective(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Why a snapshot was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    /// Fetched during an availability epoch that has since ended.
    StaleEpoch { epoch: u64, current: u64 },
    /// The pool is unavailable.
    Unavailable,
}

/// Result of submitting one snapshot to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// Dropped without touching the graph.
    Discarded(DiscardReason),
    /// Identity set unchanged; nothing mutated, nothing notified.
    Unchanged,
    /// Collection replaced; observers notified.
    Applied(ChangeSet),
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

impl PoolGraph {
    /// Reconcile `kind` against a freshly fetched snapshot.
    pub(crate) fn reconcile(&mut self, kind: EntityKind, lines: &[String]) -> ReconcileOutcome {
        let names = self.incoming_identities(kind, lines);
        if self.same_identities(kind, &names) {
            let changes = self.scan_unchanged(kind, lines);
            self.last_changes.insert(kind, changes);
            return ReconcileOutcome::Unchanged;
        }

        let decoded = decode_snapshot(kind, lines);
        let changes = self.merge(kind, &decoded);
        self.raw.insert(kind, raw_state(lines, &decoded));
        self.last_changes.insert(kind, changes.clone());

        if changes.is_effective() {
            let version = self.publish(kind);
            debug!(
                kind = %kind,
                version,
                added = changes.added.len(),
                removed = changes.removed.len(),
                drifted = changes.drifted.len(),
                malformed = changes.malformed,
                "collection reconciled"
            );
            ReconcileOutcome::Applied(changes)
        } else {
            ReconcileOutcome::Unchanged
        }
    }

    /// Identities of the lines that decode. A line identical to one of
    /// the previous snapshot keeps its earlier verdict; any other line
    /// is decoded in full.
    fn incoming_identities(&self, kind: EntityKind, lines: &[String]) -> Vec<String> {
        let previous = self.raw.get(&kind);
        lines
            .iter()
            .filter_map(|line| match previous {
                Some(raw) if raw.lines.contains(line) => {
                    if raw.malformed.contains(line) {
                        None
                    } else {
                        extract_name(kind, line)
                    }
                }
                _ => decode_line(kind, line).ok().map(|d| d.identity().to_owned()),
            })
            .collect()
    }

    fn same_identities(&self, kind: EntityKind, names: &[String]) -> bool {
        let incoming: HashSet<&str> = names.iter().map(String::as_str).collect();
        let current = self.identities(kind);
        incoming.len() == current.len() && current.iter().all(|n| incoming.contains(n.as_str()))
    }

    /// Identity set unchanged: decode only lines not seen last time,
    /// to report drift and malformed lines without touching the graph.
    fn scan_unchanged(&mut self, kind: EntityKind, lines: &[String]) -> ChangeSet {
        let previous = self.raw.remove(&kind).unwrap_or_default();
        let mut changes = ChangeSet::default();
        let mut malformed = HashSet::new();

        for line in lines {
            if previous.lines.contains(line) {
                if previous.malformed.contains(line) {
                    malformed.insert(line.clone());
                }
                continue;
            }
            match decode_line(kind, line) {
                Ok(descriptor) => {
                    if self.drifted(kind, &descriptor) {
                        changes.drifted.push(descriptor.identity().to_owned());
                    }
                }
                Err(error) => {
                    warn!(kind = %kind, line = %line, error = %error, "skipping undecodable snapshot line");
                    malformed.insert(line.clone());
                }
            }
        }

        changes.malformed = malformed.len();
        for name in &changes.drifted {
            info!(kind = %kind, name = %name, "remote payload changed, keeping cached entity");
        }
        self.raw.insert(
            kind,
            RawState {
                lines: lines.iter().cloned().collect(),
                malformed,
            },
        );
        changes
    }

    fn merge(&mut self, kind: EntityKind, decoded: &DecodedSnapshot) -> ChangeSet {
        let mut changes = ChangeSet {
            malformed: decoded.failures.len(),
            ..ChangeSet::default()
        };
        let incoming: HashSet<&str> = decoded.descriptors.iter().map(Descriptor::identity).collect();
        changes.removed = self
            .identities(kind)
            .into_iter()
            .filter(|name| !incoming.contains(name.as_str()))
            .collect();

        match kind {
            EntityKind::ControllerClasses => self.merge_classes(decoded, &mut changes),
            EntityKind::Controllers => self.merge_controllers(decoded, &mut changes),
            _ => self.merge_elements(kind, decoded, &mut changes),
        }

        for name in &changes.drifted {
            info!(kind = %kind, name = %name, "remote payload changed, keeping cached entity");
        }
        resolve::after_reconcile(self, kind);
        changes
    }

    // ── Per-type merges ──────────────────────────────────────────────

    fn merge_classes(&mut self, decoded: &DecodedSnapshot, changes: &mut ChangeSet) {
        let mut next = IndexMap::new();
        for descriptor in &decoded.descriptors {
            let Descriptor::Class(d) = descriptor else { continue };
            let entity = match self.classes.get(&d.key) {
                Some(existing) => {
                    if class_drifted(existing, d) {
                        changes.drifted.push(d.key.clone());
                    }
                    Arc::clone(existing)
                }
                None => {
                    changes.added.push(d.key.clone());
                    Arc::new(ControllerClass::new(
                        d.class_name.clone(),
                        d.controller_type,
                        d.module.clone(),
                    ))
                }
            };
            next.insert(d.key.clone(), entity);
        }
        for name in &changes.removed {
            if let Some(class) = self.classes.get(name) {
                self.retire_class(class);
            }
        }
        self.classes.replace(next);
    }

    fn merge_controllers(&mut self, decoded: &DecodedSnapshot, changes: &mut ChangeSet) {
        let mut next = IndexMap::new();
        for descriptor in &decoded.descriptors {
            let Descriptor::Controller(d) = descriptor else { continue };
            let entity = match self.controllers.get(&d.name) {
                Some(existing) => {
                    if existing.descriptor() != d {
                        changes.drifted.push(d.name.clone());
                    }
                    Arc::clone(existing)
                }
                None => {
                    changes.added.push(d.name.clone());
                    Arc::new(Controller::new(ControllerDescriptor::clone(d)))
                }
            };
            next.insert(d.name.clone(), entity);
        }
        for name in &changes.removed {
            if let Some(ctrl) = self.controllers.get(name) {
                self.retire_controller(ctrl);
            }
        }
        self.controllers.replace(next);
    }

    fn merge_elements(&mut self, kind: EntityKind, decoded: &DecodedSnapshot, changes: &mut ChangeSet) {
        let Some(current) = self.devices(kind) else {
            return;
        };
        let mut next = IndexMap::new();
        for descriptor in &decoded.descriptors {
            let Descriptor::Element(d) = descriptor else { continue };
            let entity = if let Some(existing) = current.get(&d.name) {
                if element_drifted(existing, d) {
                    changes.drifted.push(d.name.clone());
                }
                Arc::clone(existing)
            } else {
                changes.added.push(d.name.clone());
                self.materialize(kind, d)
            };
            next.insert(d.name.clone(), entity);
        }
        for name in &changes.removed {
            if let Some(element) = current.get(name) {
                self.retire_element(kind, element);
            }
        }
        if let Some(collection) = self.devices_mut(kind) {
            collection.replace(next);
        }
    }

    /// New entity for a line, or the shared pseudo-counter instance
    /// already held by the partner collection.
    fn materialize(&self, kind: EntityKind, descriptor: &ElementDescriptor) -> Arc<Element> {
        if let Some(shared) = self.shared_instance(kind, &descriptor.name, descriptor.kind) {
            debug!(kind = %kind, name = %descriptor.name, "sharing pseudo counter instance");
            if let Some(members) = &descriptor.members {
                shared.set_declared_members(members.clone());
            }
            return shared;
        }
        Arc::new(Element::new(ElementDescriptor::clone(descriptor)))
    }

    fn drifted(&self, kind: EntityKind, descriptor: &Descriptor) -> bool {
        match descriptor {
            Descriptor::Class(d) => self.classes.get(&d.key).is_some_and(|c| class_drifted(c, d)),
            Descriptor::Controller(d) => self.controllers.get(&d.name).is_some_and(|c| c.descriptor() != d),
            Descriptor::Element(d) => self.element(kind, &d.name).is_some_and(|e| element_drifted(e, d)),
        }
    }
}

fn class_drifted(existing: &ControllerClass, descriptor: &ClassDescriptor) -> bool {
    existing.controller_type() != descriptor.controller_type || *existing.module() != descriptor.module
}

/// Members are compared only when the line grammar carries them, so a
/// pseudo counter seen through the channel list never reports drift.
fn element_drifted(existing: &Element, descriptor: &ElementDescriptor) -> bool {
    existing.address() != descriptor.address
        || existing.kind() != descriptor.kind
        || existing.placement() != descriptor.placement.as_ref()
        || descriptor
            .members
            .as_ref()
            .is_some_and(|members| *members != existing.declared_members())
}

fn raw_state(lines: &[String], decoded: &DecodedSnapshot) -> RawState {
    RawState {
        lines: lines.iter().cloned().collect(),
        malformed: decoded.failures.iter().map(|f| f.line.clone()).collect(),
    }
}
