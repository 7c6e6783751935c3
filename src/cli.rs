//! CLI interface for the tunnel key tooling.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Switchboard tunnel key tooling
#[derive(Parser, Debug)]
#[command(
    name = "switchboard-tunnel",
    author,
    version,
    about = "Agent key management for the switchboard tunnel",
    long_about = r#"
Key tooling for the switchboard tunnel:

  - Generate or load the agent's Ed25519 key pair
  - Print the agent id the proxy must register

QUICK START:
  Generate keys:   switchboard-tunnel keygen
  Show identity:   switchboard-tunnel id
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the agent key pair (or load it if it already exists)
    Keygen(KeygenArgs),

    /// Print the agent id for the local key pair
    Id(IdArgs),
}

/// Arguments for the keygen command
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Key location: a directory (default file names) or the private key
    /// path (public path derived as a sibling)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Arguments for the id command
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Key location, as for keygen
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}
