//! `decode`: run snapshot lines through the per-kind grammars offline.

use std::io::{self, BufRead};

use serde::Serialize;
use tabled::Tabled;

use poolsync_core::codec::DecodedSnapshot;
use poolsync_core::{Descriptor, decode_snapshot};

use crate::cli::{DecodeArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::entity_kind;

#[derive(Serialize, Tabled)]
struct DescriptorRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl From<&Descriptor> for DescriptorRow {
    fn from(d: &Descriptor) -> Self {
        match d {
            Descriptor::Class(c) => Self {
                name: c.key.clone(),
                kind: c.controller_type.to_string(),
                address: String::new(),
                details: format!("{} ({})", c.module.path, c.module.language),
            },
            Descriptor::Controller(c) => Self {
                name: c.name.clone(),
                kind: c.declared_type.to_string(),
                address: String::new(),
                details: format!("{}.{} from {} ({})", c.module, c.class_name, c.library, c.language),
            },
            Descriptor::Element(e) => {
                let mut details = Vec::new();
                if let Some(p) = &e.placement {
                    details.push(format!("{}/{}", p.controller, p.index));
                }
                if let Some(members) = &e.members {
                    details.push(format!("members: {}", members.join(", ")));
                }
                Self {
                    name: e.name.clone(),
                    kind: e.kind.to_string(),
                    address: e.address.clone(),
                    details: details.join("; "),
                }
            }
        }
    }
}

fn read_stdin() -> Result<Vec<String>, CliError> {
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn table(decoded: &DecodedSnapshot) -> String {
    let rows: Vec<DescriptorRow> = decoded.descriptors.iter().map(DescriptorRow::from).collect();
    output::render_table(&rows)
}

pub fn handle(args: DecodeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let kind = entity_kind(args.kind);
    let lines = if args.lines.is_empty() { read_stdin()? } else { args.lines };
    let decoded = decode_snapshot(kind, lines.as_slice());

    let out = output::render_single(&global.output, &decoded, table, |d| {
        d.descriptors
            .iter()
            .map(|x| x.identity().to_owned())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    let structured = !matches!(global.output, OutputFormat::Table | OutputFormat::Plain);
    if structured || !decoded.descriptors.is_empty() {
        output::print_output(&out, global.quiet);
    }

    match decoded.failures.first() {
        None => Ok(()),
        Some(first) => Err(CliError::DecodeFailed {
            kind: kind.to_string(),
            failed: decoded.failures.len(),
            total: lines.len(),
            first: format!("line {}: {}", first.index + 1, first.error),
        }),
    }
}
