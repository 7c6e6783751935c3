//! Switchboard tunnel CLI - agent key tooling.

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;

use switchboard_tunnel::cli::{Cli, Commands, IdArgs, KeygenArgs};
use switchboard_tunnel::config::{init_logging, LoggingConfig};
use switchboard_tunnel::crypto::{
    agent_key_paths, key_paths_from_override, load_or_create_agent_key_at,
};
use switchboard_tunnel::error::Result;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    // Dispatch command
    match cli.command {
        Commands::Keygen(args) => run_keygen(args),
        Commands::Id(args) => run_id(args),
    }
}

fn resolve_paths(path: Option<PathBuf>) -> Result<(PathBuf, PathBuf)> {
    match path {
        Some(p) => Ok(key_paths_from_override(&p)),
        None => agent_key_paths(),
    }
}

/// Generate (or load) the agent key pair and show where it lives.
fn run_keygen(args: KeygenArgs) -> Result<()> {
    let (private_path, public_path) = resolve_paths(args.path)?;
    let key = load_or_create_agent_key_at(&private_path, &public_path)?;

    println!("{} Agent key pair ready", "✓".green());
    println!("  private:  {}", private_path.display());
    println!("  public:   {}", public_path.display());
    println!("  agent id: {}", key.agent_id.bright_cyan());
    println!();
    println!("Register the agent id (and public key) with your proxy to allow this agent.");
    Ok(())
}

/// Print the bare agent id, suitable for scripting.
fn run_id(args: IdArgs) -> Result<()> {
    let (private_path, public_path) = resolve_paths(args.path)?;
    let key = load_or_create_agent_key_at(&private_path, &public_path)?;
    println!("{}", key.agent_id);
    Ok(())
}
