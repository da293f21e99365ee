//! `watch`: follow the capture file and print every change notice.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use poolsync_core::{ChangeNotice, EntityKind, PoolClient};

use crate::capture::CaptureSource;
use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::{entity_kind, warn_incomplete};

#[derive(Serialize)]
struct NoticeLine {
    at: DateTime<Utc>,
    kind: EntityKind,
    version: u64,
    names: Vec<String>,
}

impl From<ChangeNotice> for NoticeLine {
    fn from(n: ChangeNotice) -> Self {
        Self {
            at: Utc::now(),
            kind: n.kind,
            version: n.version,
            names: n.snapshot.names(),
        }
    }
}

fn format_notice(line: &NoticeLine, format: &OutputFormat) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(line)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(line)?.trim_end()),
        OutputFormat::Plain => format!("{} {}", line.kind, line.names.join(",")),
        OutputFormat::Table => format!(
            "{} {} v{} ({}): {}",
            line.at.format("%H:%M:%S"),
            line.kind,
            line.version,
            line.names.len(),
            line.names.join(", ")
        ),
    })
}

fn parse_interval(raw: &str) -> Result<Duration, CliError> {
    let interval = humantime::parse_duration(raw).map_err(|e| CliError::Validation {
        field: "interval".into(),
        reason: format!("'{raw}': {e}"),
    })?;
    if interval.is_zero() {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(interval)
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let interval = parse_interval(&args.interval)?;
    let target = config::resolve_target(global)?;
    let capture = CaptureSource::open(target.capture)?;

    // Refreshes follow file reloads, not the client's own timer.
    let mut pool = target.pool;
    pool.refresh_interval = Duration::ZERO;
    let client = PoolClient::new(pool, capture.source.clone());

    let kinds: Vec<EntityKind> = if args.kinds.is_empty() {
        EntityKind::BOOTSTRAP_ORDER.to_vec()
    } else {
        args.kinds.iter().copied().map(entity_kind).collect()
    };

    // Register before bootstrap so the initial contents are reported too.
    let (tx, mut rx) = mpsc::unbounded_channel();
    for &kind in &kinds {
        let mut sub = client.subscribe(kind).await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(notice) = sub.recv().await {
                if tx.send(notice).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let report = client.set_available().await?;
    warn_incomplete(&report);

    let result = follow(&client, &capture, &mut rx, interval, args.count, global).await;
    client.shutdown().await;
    result
}

async fn follow(
    client: &PoolClient,
    capture: &CaptureSource,
    rx: &mut mpsc::UnboundedReceiver<ChangeNotice>,
    interval: Duration,
    limit: Option<usize>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            notice = rx.recv() => {
                let Some(notice) = notice else { break };
                let line = format_notice(&NoticeLine::from(notice), &global.output)?;
                output::print_output(&line, global.quiet);
                seen += 1;
                if limit.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = capture.reload() {
                    warn!(path = %capture.path.display(), error = %e, "capture reload failed, keeping previous contents");
                    continue;
                }
                match client.refresh_all().await {
                    Ok(outcomes) => {
                        let applied = outcomes.values().filter(|o| o.is_applied()).count();
                        debug!(applied, "capture refreshed");
                    }
                    Err(e) => warn!(error = %e, "refresh failed"),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_must_be_positive() {
        assert_eq!(parse_interval("250ms").ok(), Some(Duration::from_millis(250)));
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("often").is_err());
    }
}
