//! `tree`: controllers and the elements they own.

use std::fmt::Write;

use owo_colors::OwoColorize;
use serde::Serialize;

use poolsync_core::{EntityKind, PoolClient};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ControllerNode {
    name: String,
    controller_type: String,
    class: String,
    elements: Vec<ElementLeaf>,
}

#[derive(Serialize)]
struct ElementLeaf {
    name: String,
    kind: String,
    index: Option<u32>,
}

#[derive(Serialize)]
struct Tree {
    controllers: Vec<ControllerNode>,
    /// Elements whose controller is not (yet) known.
    unbound: Vec<ElementLeaf>,
}

fn build(client: &PoolClient) -> Tree {
    let store = client.store();
    let controllers = store
        .controllers_snapshot()
        .iter()
        .map(|c| ControllerNode {
            name: c.name().to_owned(),
            controller_type: c.declared_type().to_string(),
            class: c.class_key(),
            elements: c
                .elements()
                .iter()
                .map(|e| ElementLeaf {
                    name: e.name().to_owned(),
                    kind: e.kind().to_string(),
                    index: e.index(),
                })
                .collect(),
        })
        .collect();

    let unbound = EntityKind::BOOTSTRAP_ORDER
        .into_iter()
        .filter(|k| k.is_controller_owned())
        .flat_map(|k| store.elements_snapshot(k).iter().cloned().collect::<Vec<_>>())
        .filter(|e| e.is_pending())
        .map(|e| ElementLeaf {
            name: e.name().to_owned(),
            kind: e.kind().to_string(),
            index: e.index(),
        })
        .collect();

    Tree { controllers, unbound }
}

fn draw(tree: &Tree, color: bool) -> String {
    let mut out = String::new();
    let branch = |out: &mut String, last: bool, leaf: &ElementLeaf| {
        let glyph = if last { "└─" } else { "├─" };
        let index = leaf.index.map(|i| format!(" #{i}")).unwrap_or_default();
        let _ = writeln!(out, "{glyph} {} ({}){index}", leaf.name, leaf.kind);
    };

    for node in &tree.controllers {
        let name = if color {
            node.name.bold().cyan().to_string()
        } else {
            node.name.clone()
        };
        let _ = writeln!(out, "{name} [{}] {}", node.controller_type, node.class);
        for (i, leaf) in node.elements.iter().enumerate() {
            branch(&mut out, i + 1 == node.elements.len(), leaf);
        }
    }

    if !tree.unbound.is_empty() {
        let header = if color {
            "(unbound)".yellow().to_string()
        } else {
            "(unbound)".to_owned()
        };
        let _ = writeln!(out, "{header}");
        for (i, leaf) in tree.unbound.iter().enumerate() {
            branch(&mut out, i + 1 == tree.unbound.len(), leaf);
        }
    }
    out.trim_end().to_owned()
}

pub fn render(client: &PoolClient, global: &GlobalOpts) -> Result<String, CliError> {
    let tree = build(client);
    let color = output::should_color(&global.color);
    output::render_single(&global.output, &tree, |t| draw(t, color), |t| {
        t.controllers.iter().map(|c| c.name.clone()).collect::<Vec<_>>().join("\n")
    })
}
