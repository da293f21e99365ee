//! Profile configuration for poolsync tools.
//!
//! TOML profiles layered with `figment` (built-in defaults, then the
//! config file, then `POOLSYNC_` environment variables) and translated
//! into a runtime [`PoolConfig`]. The file is only ever read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolsync_core::PoolConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named pool profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Background refresh period, e.g. "3s". "0s" disables it.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,

    /// Upper bound for one remote command, e.g. "30s".
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    #[serde(default = "default_true")]
    pub fetch_metadata: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            refresh_interval: default_refresh_interval(),
            command_timeout: default_command_timeout(),
            fetch_metadata: true,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_refresh_interval() -> String {
    "3s".into()
}
fn default_command_timeout() -> String {
    "30s".into()
}
fn default_true() -> bool {
    true
}

/// A named pool profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Remote address of the pool device (e.g. "pool/bl01/1").
    pub address: String,

    /// Pool name used in logs. Defaults to the profile name.
    pub pool_name: Option<String>,

    /// Capture file replayed in place of a live pool.
    pub capture: Option<PathBuf>,

    /// Override the refresh period.
    pub refresh_interval: Option<String>,

    /// Override the command timeout.
    pub command_timeout: Option<String>,

    /// Override metadata fetching.
    pub fetch_metadata: Option<bool>,
}

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.into(),
            available: self.profile_names().join(", "),
        })
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "poolsync", "poolsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("poolsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; defaults and the environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POOLSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Render a config back to TOML for display.
pub fn render_config(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

// ── PoolConfig resolution ───────────────────────────────────────────

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

/// Build a `PoolConfig` from a profile, falling back to `defaults` for
/// every field the profile leaves unset.
pub fn profile_to_pool_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<PoolConfig, ConfigError> {
    if profile.address.trim().is_empty() && profile.capture.is_none() {
        return Err(ConfigError::Validation {
            field: "address".into(),
            reason: format!("profile '{profile_name}' has neither an address nor a capture file"),
        });
    }

    let refresh = profile
        .refresh_interval
        .as_deref()
        .unwrap_or(&defaults.refresh_interval);
    let timeout = profile
        .command_timeout
        .as_deref()
        .unwrap_or(&defaults.command_timeout);

    let mut config = PoolConfig::new(
        profile.pool_name.clone().unwrap_or_else(|| profile_name.to_owned()),
        profile.address.clone(),
    );
    config.refresh_interval = parse_duration("refresh_interval", refresh)?;
    config.command_timeout = parse_duration("command_timeout", timeout)?;
    config.fetch_metadata = profile.fetch_metadata.unwrap_or(defaults.fetch_metadata);
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.refresh_interval, "3s");
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn profiles_override_defaults() {
        let (_dir, path) = write_config(
            r#"
default_profile = "lab"

[defaults]
refresh_interval = "5s"
fetch_metadata = false

[profiles.lab]
address = "pool/lab/1"
command_timeout = "2s"

[profiles.bl01]
address = "pool/bl01/1"
pool_name = "bl01-pool"
refresh_interval = "0s"
fetch_metadata = true
"#,
        );
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.profile_names(), vec!["bl01", "lab"]);

        let lab = profile_to_pool_config(cfg.profile("lab").unwrap(), "lab", &cfg.defaults).unwrap();
        assert_eq!(lab.name, "lab");
        assert_eq!(lab.address, "pool/lab/1");
        assert_eq!(lab.refresh_interval, Duration::from_secs(5));
        assert_eq!(lab.command_timeout, Duration::from_secs(2));
        assert!(!lab.fetch_metadata);

        let bl01 = profile_to_pool_config(cfg.profile("bl01").unwrap(), "bl01", &cfg.defaults).unwrap();
        assert_eq!(bl01.name, "bl01-pool");
        assert_eq!(bl01.refresh_interval, Duration::ZERO);
        assert!(bl01.fetch_metadata);
    }

    #[test]
    fn unknown_profile_lists_the_available_ones() {
        let (_dir, path) = write_config("[profiles.a]\naddress = \"x\"\n[profiles.b]\naddress = \"y\"\n");
        let cfg = load_config_from(&path).unwrap();
        let err = cfg.profile("c").unwrap_err();
        assert_eq!(err.to_string(), "profile 'c' not found (available: a, b)");
    }

    #[test]
    fn bad_durations_and_empty_profiles_are_rejected() {
        let defaults = Defaults::default();
        let empty = Profile::default();
        assert!(matches!(
            profile_to_pool_config(&empty, "p", &defaults),
            Err(ConfigError::Validation { .. })
        ));

        let bad = Profile {
            address: "pool/x/1".into(),
            refresh_interval: Some("soon".into()),
            ..Profile::default()
        };
        let err = profile_to_pool_config(&bad, "p", &defaults).unwrap_err();
        assert!(err.to_string().contains("refresh_interval"));
    }

    #[test]
    fn capture_only_profile_is_accepted() {
        let profile = Profile {
            capture: Some(PathBuf::from("pool.toml")),
            ..Profile::default()
        };
        let cfg = profile_to_pool_config(&profile, "offline", &Defaults::default()).unwrap();
        assert_eq!(cfg.address, "");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(3));
    }

    #[test]
    fn renders_back_to_toml() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                address: "pool/lab/1".into(),
                ..Profile::default()
            },
        );
        let text = render_config(&cfg).unwrap();
        assert!(text.contains("[profiles.lab]"));
        assert!(text.contains("address = \"pool/lab/1\""));
    }
}
