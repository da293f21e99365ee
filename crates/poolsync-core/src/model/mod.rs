// ── Domain model ──
//
// Entities are shared as `Arc`s. Identity fields come straight from the
// decoded line and never change; cross-references sit in swap cells the
// engine rewrites during reconciliation.

pub mod class;
pub mod controller;
pub mod element;
pub mod kind;

pub use class::{
    ClassImage, ClassInfo, ControllerClass, ImageRole, ModuleIdentity, PredefinedValue,
    PropertySchema, RoleSchema, class_key,
};
pub use controller::{Controller, ControllerState, PropertyValue};
pub use element::{Element, MeasurementSettings};
pub use kind::{ControllerType, ElementKind, EntityKind, Language};
