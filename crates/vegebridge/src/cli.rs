//! Clap derive structures for the `vegebridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vegebridge_core::ProcessorKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vegebridge -- relay Vegehub sensor hubs to an MQTT broker
#[derive(Debug, Parser)]
#[command(
    name = "vegebridge",
    version,
    about = "Relay Vegehub sensor hubs to an MQTT broker",
    long_about = "Receives readings and configuration pushed by Vegehub hubs over HTTP,\n\
        publishes them to MQTT, and hands settings changes made over MQTT back\n\
        to each hub on its next check-in.",
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
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "VEGEBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log at debug level regardless of -v
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge: HTTP listeners for hubs plus the MQTT connection
    Serve(ServeArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Flags here override the configuration file and environment.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// HTTP ports to listen on (each serves the same API)
    pub ports: Vec<u16>,

    /// Settings store file
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long, short = 'b')]
    pub broker: Option<String>,

    /// MQTT broker port
    #[arg(long, short = 'p')]
    pub mqtt_port: Option<u16>,

    /// MQTT user name
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// MQTT password
    #[arg(long, short = 'P')]
    pub password: Option<String>,

    /// Prefix for published readings and settings
    #[arg(long)]
    pub pub_topic: Option<String>,

    /// Prefix for settings commands
    #[arg(long)]
    pub sub_topic: Option<String>,

    /// Sensor processor: gate or raw
    #[arg(long)]
    pub processor: Option<ProcessorKind>,
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

    /// Print the config file location
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
