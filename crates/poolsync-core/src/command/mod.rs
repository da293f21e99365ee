// ── Command API ──
//
// All write operations flow through a unified `Command` enum. The
// client turns each variant into one remote command with positional
// string arguments, then refreshes the collections it touches.

pub mod requests;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::CoreError;
use crate::model::{ControllerType, ElementKind, EntityKind};
use crate::store::ReconcileOutcome;

pub use requests::{CreateControllerRequest, CreateElementRequest, CreateGroupRequest, PropertyAssignment};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    // ── Controllers ──────────────────────────────────────────────────
    CreateController(CreateControllerRequest),
    DeleteController {
        name: String,
    },
    InitController {
        name: String,
    },
    ReloadControllerCode {
        file_name: String,
    },

    // ── Elements ─────────────────────────────────────────────────────
    CreateElement(CreateElementRequest),
    CreateMotorGroup(CreateGroupRequest),
    CreateMeasurementGroup(CreateGroupRequest),
    DeleteElement {
        kind: ElementKind,
        name: String,
    },
}

impl Command {
    /// Check arguments locally.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::CreateController(req) => req.validate(),
            Self::CreateElement(req) => req.validate(),
            Self::CreateMotorGroup(req) | Self::CreateMeasurementGroup(req) => req.validate(),
            Self::DeleteController { name }
            | Self::InitController { name }
            | Self::DeleteElement { name, .. } => non_empty("name", name),
            Self::ReloadControllerCode { file_name } => non_empty("library file", file_name),
        }
    }

    /// Remote command name and positional arguments.
    pub fn to_invocation(&self) -> Result<(&'static str, Vec<String>), CoreError> {
        self.validate()?;
        let invocation = match self {
            Self::CreateController(req) => ("CreateController", req.args()),
            Self::DeleteController { name } => ("DeleteController", vec![name.clone()]),
            Self::InitController { name } => ("InitController", vec![name.clone()]),
            Self::ReloadControllerCode { file_name } => ("ReloadControllerCode", vec![file_name.clone()]),
            Self::CreateElement(req) => {
                let name = CreateElementRequest::command_name(req.kind).ok_or_else(|| {
                    CoreError::Internal(format!("no create command for {}", req.kind))
                })?;
                (name, req.args())
            }
            Self::CreateMotorGroup(req) => ("CreateMotorGroup", req.args()),
            Self::CreateMeasurementGroup(req) => ("CreateMeasurementGroup", req.args()),
            Self::DeleteElement { kind, name } => (delete_command(*kind), vec![name.clone()]),
        };
        Ok(invocation)
    }

    /// Collections to refresh once the command succeeded, in bootstrap order.
    pub fn affected_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = match self {
            Self::CreateController(req) => {
                let mut kinds = vec![EntityKind::Controllers];
                match req.controller_type {
                    ControllerType::PseudoMotor => kinds.push(EntityKind::PseudoMotors),
                    ControllerType::PseudoCounter => {
                        kinds.push(EntityKind::ExperimentChannels);
                        kinds.push(EntityKind::PseudoCounters);
                    }
                    _ => {}
                }
                kinds
            }
            Self::DeleteController { .. } | Self::InitController { .. } => vec![EntityKind::Controllers],
            Self::ReloadControllerCode { .. } => vec![EntityKind::ControllerClasses, EntityKind::Controllers],
            Self::CreateElement(req) => vec![req.kind.collection()],
            Self::CreateMotorGroup(_) => vec![EntityKind::MotorGroups],
            Self::CreateMeasurementGroup(_) => vec![EntityKind::MeasurementGroups],
            Self::DeleteElement { kind, .. } => {
                if *kind == ElementKind::PseudoCounter {
                    vec![EntityKind::ExperimentChannels, EntityKind::PseudoCounters]
                } else {
                    vec![kind.collection()]
                }
            }
        };
        kinds.sort_by_key(|k| EntityKind::BOOTSTRAP_ORDER.iter().position(|o| o == k));
        kinds
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationFailed {
            message: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

fn delete_command(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Motor => "DeleteMotor",
        ElementKind::PseudoMotor => "DeletePseudoMotor",
        ElementKind::MotorGroup => "DeleteMotorGroup",
        ElementKind::CounterTimer
        | ElementKind::ZeroDChannel
        | ElementKind::OneDChannel
        | ElementKind::TwoDChannel
        | ElementKind::PseudoCounter => "DeleteExpChannel",
        ElementKind::CommunicationChannel => "DeleteComChannel",
        ElementKind::IoRegister => "DeleteIORegister",
        ElementKind::MeasurementGroup => "DeleteMeasurementGroup",
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Remote command that ran.
    pub command: &'static str,
    /// Outcome of the follow-up refresh per affected collection.
    pub refreshed: IndexMap<EntityKind, ReconcileOutcome>,
}
