use anyhow::{Context, Result};
use board_sync::{PollStart, ProjectId};
use board_sync::logging::{LogFormat, init_logging};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod cmd;

#[derive(Parser)]
#[command(name = "board-sync")]
#[command(version, about = "Keep a project board's cached views in sync with the server")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Directory holding .board-sync/sync.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a project's event stream and report sync status until Ctrl-C
    Watch {
        /// Project to synchronize
        project: ProjectId,

        /// Server URL. Overrides sync.toml and BOARD_SYNC_URL.
        #[arg(long)]
        url: Option<String>,

        /// When polling starts: immediate or on_failure. Overrides sync.toml.
        #[arg(long, value_name = "POLICY")]
        poll_start: Option<PollStart>,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECONDS")]
        exit_after: Option<u64>,
    },
    /// View, validate or create sync.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the configuration file and the effective values
    Show,
    /// Validate the configuration and list any problems
    Validate,
    /// Write a default sync.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(format, cli.verbose)?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Watch {
            project,
            url,
            poll_start,
            exit_after,
        } => {
            cmd::cmd_watch(
                &project_dir,
                project.clone(),
                url.as_deref(),
                *poll_start,
                exit_after.map(Duration::from_secs),
            )
            .await?;
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
