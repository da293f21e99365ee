// ── Device entity domain type ──
//
// One type covers every device variant; `ElementKind` tells them apart
// and the composite kinds use the member list. The owning controller is
// held weakly so controller <-> element links never form an Arc cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::{Deserialize, Serialize};

use super::controller::Controller;
use super::kind::ElementKind;
use crate::codec::{ElementDescriptor, Placement};

/// Acquisition settings of a measurement group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSettings {
    pub integration_time: Option<f64>,
    pub integration_count: Option<i64>,
    /// Timer channel; always one of the group's channels.
    pub timer: Option<String>,
    /// Monitor channel; always one of the group's channels.
    pub monitor: Option<String>,
}

#[derive(Clone, Default)]
struct ElementLinks {
    controller: Option<Weak<Controller>>,
    members: Vec<Arc<Element>>,
    declared_members: Vec<String>,
}

pub struct Element {
    descriptor: ElementDescriptor,
    links: ArcSwap<ElementLinks>,
    settings: ArcSwapOption<MeasurementSettings>,
    active: AtomicBool,
}

impl Element {
    pub(crate) fn new(descriptor: ElementDescriptor) -> Self {
        let declared_members = descriptor.members.clone().unwrap_or_default();
        Self {
            descriptor,
            links: ArcSwap::from_pointee(ElementLinks {
                declared_members,
                ..ElementLinks::default()
            }),
            settings: ArcSwapOption::empty(),
            active: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Three-segment remote device name.
    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    pub fn kind(&self) -> ElementKind {
        self.descriptor.kind
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.descriptor.placement.as_ref()
    }

    pub fn controller_name(&self) -> Option<&str> {
        self.placement().map(|p| p.controller.as_str())
    }

    pub fn index(&self) -> Option<u32> {
        self.placement().map(|p| p.index)
    }

    pub fn channel_tag(&self) -> Option<&str> {
        self.descriptor.channel_tag.as_deref()
    }

    pub fn extra(&self) -> Option<&str> {
        self.descriptor.extra.as_deref()
    }

    pub fn descriptor(&self) -> &ElementDescriptor {
        &self.descriptor
    }

    /// Owning controller, if resolved and still alive.
    pub fn controller(&self) -> Option<Arc<Controller>> {
        self.links.load().controller.as_ref().and_then(Weak::upgrade)
    }

    /// `true` while a placed element waits for its controller.
    pub fn is_pending(&self) -> bool {
        self.placement().is_some() && self.controller().is_none()
    }

    /// Resolved members, in declared order.
    pub fn members(&self) -> Vec<Arc<Element>> {
        self.links.load().members.clone()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.links
            .load()
            .members
            .iter()
            .map(|m| m.name().to_owned())
            .collect()
    }

    /// Member names as last reported by the remote side.
    pub fn declared_members(&self) -> Vec<String> {
        self.links.load().declared_members.clone()
    }

    pub fn has_member(&self, element: &Element) -> bool {
        self.links
            .load()
            .members
            .iter()
            .any(|m| std::ptr::eq(Arc::as_ptr(m), element))
    }

    /// `true` if `target` is reachable through the member lists.
    pub fn contains(&self, target: &Element) -> bool {
        let mut stack = self.members();
        let mut visited: Vec<*const Element> = Vec::new();
        while let Some(member) = stack.pop() {
            let ptr = Arc::as_ptr(&member);
            if std::ptr::eq(ptr, target) {
                return true;
            }
            if visited.contains(&ptr) {
                continue;
            }
            visited.push(ptr);
            stack.extend(member.members());
        }
        false
    }

    pub fn settings(&self) -> Option<Arc<MeasurementSettings>> {
        self.settings.load_full()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    // ── Engine-side mutation ─────────────────────────────────────────

    pub(crate) fn set_controller(&self, controller: Option<&Arc<Controller>>) {
        let weak = controller.map(Arc::downgrade);
        self.links.rcu(|links| ElementLinks {
            controller: weak.clone(),
            ..ElementLinks::clone(links)
        });
    }

    pub(crate) fn set_members(&self, members: Vec<Arc<Element>>) {
        self.links.rcu(|links| ElementLinks {
            members: members.clone(),
            ..ElementLinks::clone(links)
        });
    }

    pub(crate) fn set_declared_members(&self, names: Vec<String>) {
        self.links.rcu(|links| ElementLinks {
            declared_members: names.clone(),
            ..ElementLinks::clone(links)
        });
    }

    /// Remove `element` from the member list. Returns `true` if it was there.
    pub(crate) fn detach_member(&self, element: &Element) -> bool {
        if !self.has_member(element) {
            return false;
        }
        self.links.rcu(|links| {
            let mut next = ElementLinks::clone(links);
            next.members.retain(|m| !std::ptr::eq(Arc::as_ptr(m), element));
            next
        });
        true
    }

    pub(crate) fn set_settings(&self, settings: Option<MeasurementSettings>) {
        self.settings.store(settings.map(Arc::new));
    }

    /// Drop every link and mark inactive.
    pub(crate) fn cleanup(&self) {
        self.links.store(Arc::new(ElementLinks::default()));
        self.settings.store(None);
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind)
            .field("address", &self.descriptor.address)
            .field("controller", &self.controller().map(|c| c.name().to_owned()))
            .field("members", &self.member_names())
            .finish_non_exhaustive()
    }
}
