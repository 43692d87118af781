//! Harrow CLI
//!
//! Command-line interface for operating a Harrow agent.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "harrow")]
#[command(about = "Harrow test job agent CLI", long_about = None)]
struct Cli {
    /// Agent URL
    #[arg(long, env = "HARROW_AGENT_URL", default_value = "http://localhost:9001")]
    agent_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        agent_url: cli.agent_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "harrow",
            "--agent-url",
            "http://10.0.0.5:9001",
            "run",
            "--job-id",
            "42",
            "--repo",
            "https://git.example.com/qa/suite.git",
            "--branch",
            "main",
            "--case",
            "TC0001",
            "--case",
            "TC0002",
            "--env",
            "DEBUG=1",
        ])
        .unwrap();

        assert_eq!(cli.agent_url, "http://10.0.0.5:9001");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.job_id, "42");
                assert_eq!(args.cases, vec!["TC0001", "TC0002"]);
                assert_eq!(args.image, "python:3.10");
                assert_eq!(args.env[0].name, "DEBUG");
                assert_eq!(args.env[0].value, "1");
                assert!(args.server.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_a_case() {
        let result = Cli::try_parse_from([
            "harrow",
            "run",
            "--job-id",
            "42",
            "--repo",
            "https://git.example.com/qa/suite.git",
            "--branch",
            "main",
        ]);
        assert!(result.is_err());
    }
}
