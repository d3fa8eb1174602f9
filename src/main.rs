use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use covtrack::config::Config;
use covtrack::git::GitRepo;
use covtrack::pipeline::{self, RunMode};
use covtrack::report::{SnapshotReport, TextFormatter};
use covtrack::runner::CommandRunner;
use covtrack::store;

/// covtrack — incremental per-branch coverage tracking and test selection.
#[derive(Parser)]
#[command(name = "covtrack", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "covtrack.json")]
    config: PathBuf,

    /// Override the snapshot store path from the config.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("covtrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.store.db = db;
    }

    let mut conn = store::open(&config.store.db).context("Failed to open snapshot store")?;
    store::init_schema(&conn).context("Failed to initialize store schema")?;

    let vcs = GitRepo::new(&config.git);
    let runner = CommandRunner::new(config.runner.clone(), config.git.root.clone());

    let outcome = pipeline::run(&config, &mut conn, &vcs, &runner)?;

    match outcome.mode {
        RunMode::Bootstrap => println!(
            "Bootstrapped coverage for branch '{}' at {}",
            outcome.branch, outcome.revision
        ),
        RunMode::NoChange => println!(
            "Branch '{}' already processed at {}",
            outcome.branch, outcome.revision
        ),
        RunMode::Incremental { selected } => println!(
            "Updated branch '{}' to {} ({} filter tokens)",
            outcome.branch, outcome.revision, selected
        ),
    }
    print!(
        "{}",
        SnapshotReport::from_snapshot(&outcome.snapshot).format(&TextFormatter)
    );

    Ok(())
}
