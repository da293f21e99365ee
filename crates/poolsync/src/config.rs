//! CLI configuration: a thin wrapper around `poolsync_config`.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--profile,
//! --config, --capture).

use std::path::PathBuf;

use poolsync_core::PoolConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use poolsync_config::{Config, Profile, config_path, load_config_from, profile_to_pool_config, render_config};

/// What a pool-bound command runs against.
#[derive(Debug)]
pub struct Target {
    pub pool: PoolConfig,
    pub capture: PathBuf,
}

/// Config file named by --config, or the platform default.
pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config, honouring --config.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config_from(&effective_path(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve the pool and capture file for a pool-bound command.
///
/// --capture wins over the profile's capture. Without any profile,
/// --capture alone is enough; an explicitly requested profile must exist.
pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = load(global)?;
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let pool = profile_to_pool_config(profile, &profile_name, &cfg.defaults)?;
        let capture = global
            .capture
            .clone()
            .or_else(|| profile.capture.clone())
            .ok_or(CliError::NoCapture { profile: profile_name })?;
        return Ok(Target { pool, capture });
    }

    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: cfg.profile_names().join(", "),
        });
    }

    let capture = global.capture.clone().ok_or_else(|| CliError::NoConfig {
        path: effective_path(global).display().to_string(),
    })?;
    let adhoc = Profile {
        capture: Some(capture.clone()),
        ..Profile::default()
    };
    let pool = profile_to_pool_config(&adhoc, "capture", &cfg.defaults)?;
    Ok(Target { pool, capture })
}
