//! `show`: print one collection, or one entity in detail.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use poolsync_core::{
    ClassInfo, CollectionSnapshot, Controller, ControllerClass, Element, EntityKind, MeasurementSettings,
    PoolClient, PropertyValue,
};

use crate::cli::{GlobalOpts, ShowArgs};
use crate::error::CliError;
use crate::output::{self, detail_lines};

use super::entity_kind;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Serialize, Tabled)]
struct ClassRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    controller_type: String,
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Arc<ControllerClass>> for ClassRow {
    fn from(c: &Arc<ControllerClass>) -> Self {
        Self {
            key: c.key(),
            controller_type: c.controller_type().to_string(),
            language: c.language().to_string(),
            path: c.module().path.clone(),
            description: c.info().description.clone(),
        }
    }
}

#[derive(Serialize, Tabled)]
struct ControllerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    controller_type: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Library")]
    library: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Elements")]
    elements: usize,
}

impl From<&Arc<Controller>> for ControllerRow {
    fn from(c: &Arc<Controller>) -> Self {
        Self {
            name: c.name().to_owned(),
            controller_type: c.declared_type().to_string(),
            class: c.class_name().to_owned(),
            library: c.library().to_owned(),
            state: c.state().to_string(),
            elements: c.element_count(),
        }
    }
}

#[derive(Serialize, Tabled)]
struct ElementRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Controller")]
    controller: String,
    #[tabled(rename = "Members")]
    members: String,
}

impl From<&Arc<Element>> for ElementRow {
    fn from(e: &Arc<Element>) -> Self {
        Self {
            name: e.name().to_owned(),
            kind: e.kind().to_string(),
            address: e.address().to_owned(),
            controller: controller_label(e),
            members: e.member_names().join(", "),
        }
    }
}

/// Bound controller name, or the declared one marked unresolved.
fn controller_label(e: &Element) -> String {
    match (e.controller(), e.controller_name()) {
        (Some(c), _) => c.name().to_owned(),
        (None, Some(declared)) => format!("{declared} (unresolved)"),
        (None, None) => String::new(),
    }
}

// ── Detail views ────────────────────────────────────────────────────

#[derive(Serialize)]
struct ClassDetail {
    key: String,
    controller_type: String,
    path: String,
    info: Arc<ClassInfo>,
}

#[derive(Serialize)]
struct ControllerDetail {
    #[serde(flatten)]
    row: ControllerRow,
    class_key: String,
    element_names: Vec<String>,
    properties: Vec<PropertyValue>,
}

#[derive(Serialize)]
struct ElementDetail {
    #[serde(flatten)]
    row: ElementRow,
    index: Option<u32>,
    declared_members: Vec<String>,
    settings: Option<Arc<MeasurementSettings>>,
}

fn class_detail(c: &ClassDetail) -> String {
    let mut pairs = vec![
        ("Key", c.key.clone()),
        ("Type", c.controller_type.clone()),
        ("Path", c.path.clone()),
        ("Description", c.info.description.clone()),
        ("Model", c.info.model.clone()),
        ("Organization", c.info.organization.clone()),
    ];
    for p in &c.info.properties {
        let default = p.default_value.as_deref().unwrap_or("-");
        pairs.push(("Property", format!("{} ({}) default {default}", p.name, p.declared_type)));
    }
    if let Some(roles) = &c.info.roles {
        pairs.push(("Physical roles", roles.physical.join(", ")));
        pairs.push(("Pseudo roles", roles.pseudo.join(", ")));
    }
    detail_lines(&pairs)
}

fn controller_detail(c: &ControllerDetail) -> String {
    let mut pairs = vec![
        ("Name", c.row.name.clone()),
        ("Type", c.row.controller_type.clone()),
        ("Class", c.class_key.clone()),
        ("State", c.row.state.clone()),
        ("Elements", c.element_names.join(", ")),
    ];
    for p in &c.properties {
        pairs.push(("Property", format!("{} = {}", p.name, p.value)));
    }
    detail_lines(&pairs)
}

fn element_detail(e: &ElementDetail) -> String {
    let mut pairs = vec![
        ("Name", e.row.name.clone()),
        ("Kind", e.row.kind.clone()),
        ("Address", e.row.address.clone()),
    ];
    if !e.row.controller.is_empty() {
        pairs.push(("Controller", e.row.controller.clone()));
    }
    if let Some(index) = e.index {
        pairs.push(("Index", index.to_string()));
    }
    if !e.declared_members.is_empty() {
        pairs.push(("Members", e.row.members.clone()));
        pairs.push(("Declared", e.declared_members.join(", ")));
    }
    if let Some(s) = &e.settings {
        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".into());
        pairs.push(("Timer", or_dash(s.timer.clone())));
        pairs.push(("Monitor", or_dash(s.monitor.clone())));
        pairs.push(("Integration time", or_dash(s.integration_time.map(|t| t.to_string()))));
        pairs.push(("Integration count", or_dash(s.integration_count.map(|c| c.to_string()))));
    }
    detail_lines(&pairs)
}

// ── Render ──────────────────────────────────────────────────────────

fn not_found(kind: EntityKind, name: &str) -> CliError {
    CliError::NotFound {
        kind: kind.to_string(),
        name: name.to_owned(),
    }
}

pub fn render(client: &PoolClient, args: &ShowArgs, global: &GlobalOpts) -> Result<String, CliError> {
    let kind = entity_kind(args.kind);
    let store = client.store();
    let format = &global.output;

    let Some(name) = args.name.as_deref() else {
        return match store.snapshot(kind) {
            CollectionSnapshot::Classes(s) => {
                let rows: Vec<ClassRow> = s.iter().map(ClassRow::from).collect();
                output::render_list(format, &rows, |r| r.key.clone())
            }
            CollectionSnapshot::Controllers(s) => {
                let rows: Vec<ControllerRow> = s.iter().map(ControllerRow::from).collect();
                output::render_list(format, &rows, |r| r.name.clone())
            }
            CollectionSnapshot::Elements(s) => {
                let rows: Vec<ElementRow> = s.iter().map(ElementRow::from).collect();
                output::render_list(format, &rows, |r| r.name.clone())
            }
        };
    };

    match kind {
        EntityKind::ControllerClasses => {
            let class = store
                .classes_snapshot()
                .iter()
                .find(|c| c.key() == name || c.class_name() == name)
                .cloned()
                .or_else(|| store.class_by_qualified_name(name))
                .ok_or_else(|| not_found(kind, name))?;
            let detail = ClassDetail {
                key: class.key(),
                controller_type: class.controller_type().to_string(),
                path: class.module().path.clone(),
                info: class.info(),
            };
            output::render_single(format, &detail, class_detail, |d| d.key.clone())
        }
        EntityKind::Controllers => {
            let ctrl = store.controller(name).ok_or_else(|| not_found(kind, name))?;
            let detail = ControllerDetail {
                row: ControllerRow::from(&ctrl),
                class_key: ctrl.class_key(),
                element_names: ctrl.elements().iter().map(|e| e.name().to_owned()).collect(),
                properties: ctrl.properties(),
            };
            output::render_single(format, &detail, controller_detail, |d| d.row.name.clone())
        }
        _ => {
            let element = store.element(kind, name).ok_or_else(|| not_found(kind, name))?;
            let detail = ElementDetail {
                row: ElementRow::from(&element),
                index: element.index(),
                declared_members: element.declared_members(),
                settings: element.settings(),
            };
            output::render_single(format, &detail, element_detail, |d| d.row.name.clone())
        }
    }
}
