//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod task;

pub use task::RunArgs;

use anyhow::Result;
use clap::Subcommand;
use harrow_client::AgentClient;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the agent is up
    Heartbeat,
    /// Submit a test job
    Run(RunArgs),
    /// Show a job's state
    Status {
        /// Job ID
        id: String,
    },
    /// List every job the agent tracks
    List,
    /// Stop a job's container
    Stop {
        /// Job ID
        id: String,
    },
    /// Force-remove a job's container
    Delete {
        /// Job ID
        id: String,
    },
    /// Print the container's output so far
    Logs {
        /// Job ID
        id: String,
    },
    /// Download the job's full log file
    Download {
        /// Job ID
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Follow the job's log live until the agent closes it or Ctrl-C
    Follow {
        /// Job ID
        id: String,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = AgentClient::new(config.agent_url.clone());

    match command {
        Commands::Heartbeat => task::heartbeat(&client).await,
        Commands::Run(args) => task::run(&client, args).await,
        Commands::Status { id } => task::status(&client, &id).await,
        Commands::List => task::list(&client).await,
        Commands::Stop { id } => task::stop(&client, &id).await,
        Commands::Delete { id } => task::delete(&client, &id).await,
        Commands::Logs { id } => task::logs(&client, &id).await,
        Commands::Download { id, output } => task::download(&client, &id, output).await,
        Commands::Follow { id } => task::follow(&client, &id).await,
    }
}
