//! Command dispatch: bridges CLI args -> pool client -> output formatting.

pub mod config_cmd;
pub mod decode;
pub mod show;
pub mod tree;
pub mod watch;

use poolsync_core::{BootstrapReport, EntityKind, PoolClient};
use tracing::warn;

use crate::capture::CaptureSource;
use crate::cli::{Command, GlobalOpts, Kind};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Collection named by a CLI kind selector.
pub fn entity_kind(kind: Kind) -> EntityKind {
    match kind {
        Kind::ControllerClasses => EntityKind::ControllerClasses,
        Kind::Controllers => EntityKind::Controllers,
        Kind::CommunicationChannels => EntityKind::CommunicationChannels,
        Kind::IoRegisters => EntityKind::IoRegisters,
        Kind::Motors => EntityKind::Motors,
        Kind::PseudoMotors => EntityKind::PseudoMotors,
        Kind::ExperimentChannels => EntityKind::ExperimentChannels,
        Kind::PseudoCounters => EntityKind::PseudoCounters,
        Kind::MotorGroups => EntityKind::MotorGroups,
        Kind::MeasurementGroups => EntityKind::MeasurementGroups,
    }
}

fn warn_incomplete(report: &BootstrapReport) {
    for (kind, reason) in &report.failed {
        warn!(kind = %kind, reason = %reason, "collection could not be loaded");
    }
}

/// Bootstrap once from the target's capture, render, and leave.
async fn render_once<F>(global: &GlobalOpts, render: F) -> Result<String, CliError>
where
    F: FnOnce(&PoolClient) -> Result<String, CliError>,
{
    let target = config::resolve_target(global)?;
    let capture = CaptureSource::open(target.capture)?;
    PoolClient::oneshot(target.pool, capture.source, |client, report| async move {
        warn_incomplete(&report);
        Ok(render(&client))
    })
    .await?
}

/// Dispatch a pool-bound command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let out = match cmd {
        Command::Decode(args) => return decode::handle(args, global),
        Command::Show(args) => render_once(global, |client| show::render(client, &args, global)).await?,
        Command::Tree => render_once(global, |client| tree::render(client, global)).await?,
        Command::Watch(args) => return watch::handle(args, global).await,
        Command::Config(args) => return config_cmd::handle(args, global),
        // Completions are handled in main before dispatch
        Command::Completions(_) => return Ok(()),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
