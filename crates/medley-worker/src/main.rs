//! medley-scanner - reads audio tags for the medley collection manager.
//!
//! Usage:
//!   medley-scanner --batch FILE [--checkpoint FILE] [--incremental] [--recursive] [--restart]
//!   medley-scanner [--recursive] DIR...
//!   medley-scanner --version

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use medley_worker::{WorkerOptions, run};

#[derive(Parser)]
#[command(
    name = "medley-scanner",
    version,
    about = "Scan music directories and report their tracks as a stream"
)]
struct Cli {
    /// Batch file listing directories and their known mtimes
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Journal the finished directories are recorded in
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Skip directories that did not change since the last scan
    #[arg(short, long)]
    incremental: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Skip the directories recorded in the checkpoint
    #[arg(long)]
    restart: bool,

    /// Directories to scan in addition to the batch
    directories: Vec<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    // stdout carries the stream, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("MEDLEY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let options = WorkerOptions {
        batch: cli.batch,
        directories: cli.directories,
        checkpoint: cli.checkpoint,
        incremental: cli.incremental,
        recursive: cli.recursive,
        restart: cli.restart,
    };

    let stdout = std::io::stdout().lock();
    run(&options, stdout).context("Scan failed")?;
    Ok(())
}
