//! Clap derive structures for the `poolsync` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// poolsync -- inspect and follow a hardware pool server
#[derive(Debug, Parser)]
#[command(
    name = "poolsync",
    version,
    about = "Inspect and follow a hardware pool server",
    long_about = "Keeps a local, cross-linked view of a pool's controllers, motors,\n\
        channels and groups in step with the remote snapshots.\n\n\
        Snapshots are read from a TOML capture file named by the active\n\
        profile or by --capture.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Pool profile to use
    #[arg(long, short = 'p', env = "POOLSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "POOLSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Capture file to read snapshots from (overrides the profile)
    #[arg(long, env = "POOLSYNC_CAPTURE", global = true)]
    pub capture: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "POOLSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one name per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Pool collection selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    /// Controller class catalogue
    #[value(alias = "classes")]
    ControllerClasses,
    /// Controller instances
    #[value(alias = "ctrls")]
    Controllers,
    /// Communication channels
    CommunicationChannels,
    /// IO registers
    IoRegisters,
    /// Physical motors
    Motors,
    /// Pseudo motors
    PseudoMotors,
    /// Experiment channels (counter/timers, 0D, 1D, 2D, pseudo counters)
    #[value(alias = "channels")]
    ExperimentChannels,
    /// Pseudo counters
    PseudoCounters,
    /// Motor groups
    MotorGroups,
    /// Measurement groups
    MeasurementGroups,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode snapshot lines of one collection (reads stdin when no line is given)
    Decode(DecodeArgs),

    /// Bootstrap from the capture and print one collection or entity
    #[command(alias = "get")]
    Show(ShowArgs),

    /// Print controllers and the elements they own
    Tree,

    /// Follow the capture file and print every change notice
    Watch(WatchArgs),

    /// Inspect CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ───────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Collection the lines belong to
    pub kind: Kind,

    /// Snapshot lines
    pub lines: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Collection to print
    pub kind: Kind,

    /// Print a single entity in detail
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Collections to follow (all when omitted)
    #[arg(long, short = 'k', value_delimiter = ',')]
    pub kinds: Vec<Kind>,

    /// Re-read period of the capture file, e.g. "500ms", "2s"
    #[arg(long, short = 'i', default_value = "1s")]
    pub interval: String,

    /// Exit after this many notices
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
