// ── Controller domain type ──
//
// An instantiated controller class. The decoded line is immutable;
// the class binding, owned elements and instance properties live in a
// swap cell that only the engine writes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::class::{ControllerClass, class_key};
use super::element::Element;
use super::kind::{ControllerType, Language};
use crate::codec::ControllerDescriptor;

/// Controller health as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ControllerState {
    /// Class resolved.
    Ok,
    /// Class not (yet) known.
    Invalid,
}

/// One instance-level property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    pub declared_type: String,
    pub description: String,
    pub value: String,
}

#[derive(Clone, Default)]
struct ControllerLinks {
    class: Option<Arc<ControllerClass>>,
    elements: Vec<Arc<Element>>,
    properties: Vec<PropertyValue>,
}

pub struct Controller {
    descriptor: ControllerDescriptor,
    links: ArcSwap<ControllerLinks>,
    active: AtomicBool,
}

impl Controller {
    pub(crate) fn new(descriptor: ControllerDescriptor) -> Self {
        Self {
            descriptor,
            links: ArcSwap::from_pointee(ControllerLinks::default()),
            active: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn module(&self) -> &str {
        &self.descriptor.module
    }

    pub fn class_name(&self) -> &str {
        &self.descriptor.class_name
    }

    /// Library file the class is loaded from.
    pub fn library(&self) -> &str {
        &self.descriptor.library
    }

    pub fn declared_type(&self) -> ControllerType {
        self.descriptor.declared_type
    }

    pub fn language(&self) -> Language {
        self.descriptor.language
    }

    pub fn descriptor(&self) -> &ControllerDescriptor {
        &self.descriptor
    }

    /// Key of the class this controller instantiates.
    pub fn class_key(&self) -> String {
        class_key(&self.descriptor.library, &self.descriptor.class_name)
    }

    pub fn class(&self) -> Option<Arc<ControllerClass>> {
        self.links.load().class.clone()
    }

    pub fn state(&self) -> ControllerState {
        if self.links.load().class.is_some() {
            ControllerState::Ok
        } else {
            ControllerState::Invalid
        }
    }

    /// Owned elements, ordered by kind then by collection order.
    pub fn elements(&self) -> Vec<Arc<Element>> {
        self.links.load().elements.clone()
    }

    pub fn element_count(&self) -> usize {
        self.links.load().elements.len()
    }

    pub fn owns(&self, element: &Element) -> bool {
        self.links
            .load()
            .elements
            .iter()
            .any(|e| std::ptr::eq(Arc::as_ptr(e), element))
    }

    pub fn properties(&self) -> Vec<PropertyValue> {
        self.links.load().properties.clone()
    }

    /// Effective property value: the instance value, else the class default.
    pub fn property_value(&self, name: &str) -> Option<String> {
        let links = self.links.load();
        if let Some(p) = links.properties.iter().find(|p| p.name == name) {
            return Some(p.value.clone());
        }
        links
            .class
            .as_ref()
            .and_then(|c| c.info().property(name).and_then(|p| p.default_value.clone()))
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    // ── Engine-side mutation ─────────────────────────────────────────

    pub(crate) fn set_class(&self, class: Option<Arc<ControllerClass>>) {
        self.links.rcu(|links| ControllerLinks {
            class: class.clone(),
            ..ControllerLinks::clone(links)
        });
    }

    pub(crate) fn set_elements(&self, elements: Vec<Arc<Element>>) {
        self.links.rcu(|links| ControllerLinks {
            elements: elements.clone(),
            ..ControllerLinks::clone(links)
        });
    }

    pub(crate) fn detach_element(&self, element: &Element) {
        self.links.rcu(|links| {
            let mut next = ControllerLinks::clone(links);
            next.elements.retain(|e| !std::ptr::eq(Arc::as_ptr(e), element));
            next
        });
    }

    pub(crate) fn set_properties(&self, properties: Vec<PropertyValue>) {
        self.links.rcu(|links| ControllerLinks {
            properties: properties.clone(),
            ..ControllerLinks::clone(links)
        });
    }

    /// Drop every link and mark inactive.
    pub(crate) fn cleanup(&self) {
        self.links.store(Arc::new(ControllerLinks::default()));
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links = self.links.load();
        f.debug_struct("Controller")
            .field("name", &self.descriptor.name)
            .field("class", &self.class_key())
            .field("state", &self.state())
            .field(
                "elements",
                &links.elements.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::{Descriptor, decode_line};
    use crate::model::{ClassInfo, EntityKind, ModuleIdentity, PropertySchema};

    fn controller(line: &str) -> Controller {
        match decode_line(EntityKind::Controllers, line).unwrap() {
            Descriptor::Controller(d) => Controller::new(d),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn state_follows_class_binding() {
        let ctrl = controller("ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)");
        assert_eq!(ctrl.state(), ControllerState::Invalid);
        assert_eq!(ctrl.class_key(), "icepap.py/IcepapCtrl");

        let class = Arc::new(ControllerClass::new(
            "IcepapCtrl".into(),
            ControllerType::Motor,
            ModuleIdentity::from_full_path("/ctrl/icepap.py"),
        ));
        ctrl.set_class(Some(class));
        assert_eq!(ctrl.state(), ControllerState::Ok);

        ctrl.cleanup();
        assert_eq!(ctrl.state(), ControllerState::Invalid);
        assert!(!ctrl.is_active());
    }

    #[test]
    fn instance_property_overrides_schema_default() {
        let ctrl = controller("ctrl1 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)");
        let class = Arc::new(ControllerClass::new(
            "IcepapCtrl".into(),
            ControllerType::Motor,
            ModuleIdentity::from_full_path("icepap.py"),
        ));
        class.set_info(ClassInfo {
            properties: vec![
                PropertySchema {
                    name: "Host".into(),
                    declared_type: "str".into(),
                    description: String::new(),
                    default_value: Some("icepap01".into()),
                },
                PropertySchema {
                    name: "Port".into(),
                    declared_type: "int".into(),
                    description: String::new(),
                    default_value: Some("5000".into()),
                },
            ],
            ..ClassInfo::default()
        });
        ctrl.set_class(Some(class));
        ctrl.set_properties(vec![PropertyValue {
            name: "Host".into(),
            declared_type: "str".into(),
            description: String::new(),
            value: "icepap07".into(),
        }]);

        assert_eq!(ctrl.property_value("Host").as_deref(), Some("icepap07"));
        assert_eq!(ctrl.property_value("Port").as_deref(), Some("5000"));
        assert_eq!(ctrl.property_value("Missing"), None);
    }
}
