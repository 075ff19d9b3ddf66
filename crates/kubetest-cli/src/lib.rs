//! kubetest CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// kubetest - ephemeral Kubernetes environments for test runs
#[derive(Parser, Debug)]
#[command(name = "kubetest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session, run a command against it, then tear it down
    Run(commands::run::RunArgs),
    /// Delete every resource belonging to a session
    Cleanup(commands::cleanup::CleanupArgs),
    /// Show the resources belonging to a session
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::Cleanup(args) => commands::cleanup::run(args).await,
            Commands::Status(args) => commands::status::run(args).await,
        }
    }
}
