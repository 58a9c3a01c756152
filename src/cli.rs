use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::{Engine, RunOptions, StdoutNotifier};

#[derive(Parser)]
#[command(name = "pagewatch")]
#[command(about = "Watch a handful of web pages and mail a diff when their text changes")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one monitoring pass over the URL list
    Run {
        /// URL list to use instead of the configured one
        #[arg(short, long)]
        urls: Option<PathBuf>,

        /// Print the report instead of mailing it
        #[arg(long)]
        dry_run: bool,

        /// Never send a report, even when something changed
        #[arg(long, conflicts_with = "dry_run")]
        no_notify: bool,
    },

    /// Fetch one URL and show its normalized text and fingerprint
    Check {
        /// Page to fetch
        url: String,
    },

    /// Show the stored snapshots
    Status,

    /// Write a default pagewatch.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Run { urls, dry_run, no_notify } => {
                let engine = if dry_run {
                    engine.with_notifier(Box::new(StdoutNotifier))
                } else {
                    engine
                };
                let options = RunOptions {
                    urls_file: urls,
                    notify: !no_notify,
                };
                engine.run(options).await.map(|_| ())
            }
            Commands::Check { url } => engine.check(&url).await,
            Commands::Status => engine.status().await,
            Commands::Init { path, force } => engine.init(path, force).await,
        }
    }
}
