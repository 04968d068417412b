//! Clap derive structures for the `pvs` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pvs -- watch and query a PVS solar gateway
#[derive(Debug, Parser)]
#[command(
    name = "pvs",
    version,
    about = "Poll and stream data from a PVS solar gateway",
    long_about = "Polls the gateway's varserver for device state and follows its\n\
        live-data socket for power, energy, and battery readings.",
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
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "PVS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long = "config", env = "PVS_CONFIG", global = true)]
    pub config_file: Option<PathBuf>,

    /// Gateway host or IP (overrides profile)
    #[arg(long, short = 'H', env = "PVS_HOST", global = true)]
    pub host: Option<String>,

    /// Gateway password
    #[arg(long, env = "PVS_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the gateway and follow live data until interrupted
    Watch(WatchArgs),

    /// Fetch one snapshot of device state and print it as JSON
    #[command(alias = "snap")]
    Snapshot(SnapshotArgs),

    /// List the live-data fields the gateway pushes
    LiveFields(LiveFieldsArgs),

    /// Inspect and edit the configuration file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in seconds (overrides profile)
    #[arg(long)]
    pub update_period: Option<u64>,

    /// Poll only; don't open the live-data socket
    #[arg(long)]
    pub no_live_data: bool,

    /// Only print changes to these live-data fields (wire names)
    #[arg(long, short = 'f', value_delimiter = ',')]
    pub fields: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Print per-kind device counts instead of the full snapshot
    #[arg(long)]
    pub summary: bool,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Args)]
pub struct LiveFieldsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the effective configuration (secrets masked)
    Show,

    /// Add or replace a profile
    Init(ConfigInitArgs),
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Gateway host or IP
    pub gateway: String,

    /// Profile name (defaults to the active profile)
    #[arg(long)]
    pub name: Option<String>,

    /// Environment variable holding the password
    #[arg(long)]
    pub password_env: Option<String>,

    /// Poll interval in seconds
    #[arg(long)]
    pub update_period: Option<u64>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}
