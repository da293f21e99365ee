// ── Snapshot decoding ──
//
// Turns raw snapshot lines into typed descriptors. One small parser per
// entity kind lives in `lines`; the class metadata blob decoder lives
// in `class_info`. Line failures never abort a batch.

mod class_info;
mod cursor;
mod lines;

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::error::DecodeError;
use crate::model::{ControllerType, ElementKind, EntityKind, Language, ModuleIdentity, class_key};

pub use class_info::{decode_class_info, decode_class_info_fallback, decode_controller_properties};

// ── Descriptors ─────────────────────────────────────────────────────

/// Decoded `ControllerClassList` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDescriptor {
    /// Identity key, `file_name/ClassName`.
    pub key: String,
    pub class_name: String,
    pub module: ModuleIdentity,
    pub controller_type: ControllerType,
    /// Type token exactly as sent.
    pub raw_type: String,
}

/// Decoded `ControllerList` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerDescriptor {
    pub name: String,
    /// Module part of `MODULE.CLASS/FILE`.
    pub module: String,
    pub class_name: String,
    /// File part of `MODULE.CLASS/FILE`.
    pub instance_file: String,
    pub declared_type: ControllerType,
    pub raw_type: String,
    pub language: Language,
    /// Library file the class is loaded from.
    pub library: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

/// Owning controller and index of a controller-owned element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Placement {
    pub controller: String,
    pub index: u32,
}

/// Decoded line of any device collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementDescriptor {
    pub name: String,
    /// Three-segment remote device name.
    pub address: String,
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    /// Member names, for grammars that carry a member list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
    /// Experiment channel type tag as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// Structured form of one snapshot line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "descriptor", rename_all = "snake_case")]
pub enum Descriptor {
    Class(ClassDescriptor),
    Controller(ControllerDescriptor),
    Element(ElementDescriptor),
}

impl Descriptor {
    /// Identity within its collection.
    pub fn identity(&self) -> &str {
        match self {
            Self::Class(c) => &c.key,
            Self::Controller(c) => &c.name,
            Self::Element(e) => &e.name,
        }
    }
}

// ── Batch decoding ──────────────────────────────────────────────────

/// A line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFailure {
    pub index: usize,
    pub line: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: DecodeError,
}

/// Result of decoding a whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedSnapshot {
    pub descriptors: Vec<Descriptor>,
    pub failures: Vec<LineFailure>,
}

/// Decode one line of the given kind.
pub fn decode_line(kind: EntityKind, line: &str) -> Result<Descriptor, DecodeError> {
    match kind {
        EntityKind::ControllerClasses => lines::controller_class(line).map(Descriptor::Class),
        EntityKind::Controllers => lines::controller(line).map(Descriptor::Controller),
        EntityKind::Motors => lines::placed(kind, ElementKind::Motor, line).map(Descriptor::Element),
        EntityKind::CommunicationChannels => {
            lines::placed(kind, ElementKind::CommunicationChannel, line).map(Descriptor::Element)
        }
        EntityKind::IoRegisters => {
            lines::placed(kind, ElementKind::IoRegister, line).map(Descriptor::Element)
        }
        EntityKind::PseudoMotors => lines::pseudo_motor(line).map(Descriptor::Element),
        EntityKind::PseudoCounters => lines::pseudo_counter(line).map(Descriptor::Element),
        EntityKind::ExperimentChannels => lines::experiment_channel(line).map(Descriptor::Element),
        EntityKind::MotorGroups => lines::motor_group(line).map(Descriptor::Element),
        EntityKind::MeasurementGroups => lines::measurement_group(line).map(Descriptor::Element),
    }
}

/// Decode a full snapshot, skipping (and logging) every bad line.
///
/// A repeated identity is reported as a failure so the decoded set is
/// always name-unique; the first occurrence wins.
pub fn decode_snapshot<S: AsRef<str>>(kind: EntityKind, lines: &[S]) -> DecodedSnapshot {
    let mut out = DecodedSnapshot::default();
    let mut seen = HashSet::new();

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let result = decode_line(kind, line).and_then(|descriptor| {
            if seen.insert(descriptor.identity().to_owned()) {
                Ok(descriptor)
            } else {
                Err(DecodeError::malformed(
                    kind,
                    format!("duplicate identity '{}'", descriptor.identity()),
                ))
            }
        });

        match result {
            Ok(descriptor) => out.descriptors.push(descriptor),
            Err(error) => {
                warn!(kind = %kind, line = %line, error = %error, "skipping undecodable snapshot line");
                out.failures.push(LineFailure {
                    index,
                    line: line.to_owned(),
                    error,
                });
            }
        }
    }

    out
}

/// Identity of a line without materializing its descriptor.
///
/// Only the leading tokens are inspected, so a line accepted here may
/// still fail full decoding.
pub fn extract_name(kind: EntityKind, line: &str) -> Option<String> {
    let mut cursor = cursor::Cursor::new(line);
    let name = cursor.word()?;
    if name.starts_with('(') {
        return None;
    }
    let paren = cursor.paren()?;
    match kind {
        EntityKind::ControllerClasses => {
            let module = ModuleIdentity::from_full_path(paren.trim());
            Some(class_key(&module.file_name, name))
        }
        _ => Some(name.to_owned()),
    }
}

/// Identities of every line, in order, skipping lines without one.
pub fn extract_names<S: AsRef<str>>(kind: EntityKind, lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| extract_name(kind, line.as_ref()))
        .collect()
}

fn serialize_display<S: serde::Serializer>(
    value: &DecodeError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
