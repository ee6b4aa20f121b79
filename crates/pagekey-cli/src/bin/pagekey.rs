//! pagekey: maintenance tool for a pagekey page store.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use pagekey_cli::{init_tracing, key_rows, migrate_file, normalize_ids, run_sweep, LogConfig};
use pagekey_jobs::{CoordinatorConfig, JobCoordinator};
use pagekey_store::{FilesystemStore, PageRepository, PageStore, StoreConfig};
use pagekey_sweep::SweepConfig;

#[derive(Parser)]
#[command(name = "pagekey")]
#[command(author, version, about = "Identifier and content maintenance for pagekey stores")]
#[command(propagate_version = true)]
struct Cli {
    /// Page data directory (overrides PAGEKEY_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the canonical form of one or more identifiers
    Normalize {
        /// Raw identifiers
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Run the content migrations over a single page file
    Migrate {
        /// Page file
        file: PathBuf,

        /// Rewrite the file in place instead of printing the result
        #[arg(short, long)]
        write: bool,

        /// Also convert YAML frontmatter to TOML
        #[arg(long)]
        format_upgrade: bool,
    },

    /// Move every page stored under a non-canonical key
    Sweep,

    /// List stored keys with their declared and canonical identifiers
    Keys {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print a page through the migrating read path
    Read {
        /// Page identifier
        identifier: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing(&LogConfig::from_env());

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Normalize { ids } => {
            if !normalize_ids(&ids, &mut stdout)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Migrate {
            file,
            write,
            format_upgrade,
        } => {
            migrate_file(&file, write, format_upgrade, &mut stdout).await?;
        }
        Commands::Sweep => {
            let store = open_store(cli.data_dir).await?;
            let coordinator = JobCoordinator::new(CoordinatorConfig::from_env())?;
            let report = run_sweep(store, &coordinator).await?;
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(stdout)?;
            if report.jobs_failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Keys { json } => {
            let store = open_store(cli.data_dir).await?;
            startup_sweep(&store).await?;
            let rows = key_rows(store.as_ref()).await?;
            if json {
                serde_json::to_writer_pretty(&mut stdout, &rows)?;
                writeln!(stdout)?;
            } else {
                for row in rows {
                    writeln!(
                        stdout,
                        "{}\t{}\t{}{}",
                        row.key,
                        row.declared,
                        row.canonical.as_deref().unwrap_or("-"),
                        if row.needs_move { "\t(needs move)" } else { "" }
                    )?;
                }
            }
        }
        Commands::Read { identifier } => {
            let store = open_store(cli.data_dir).await?;
            startup_sweep(&store).await?;
            let pages = PageRepository::new(store);
            let content = pages
                .read_page(&identifier)
                .await
                .with_context(|| format!("failed to read page {identifier:?}"))?;
            stdout.write_all(&content)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_store(data_dir: Option<PathBuf>) -> anyhow::Result<Arc<dyn PageStore>> {
    let mut config = StoreConfig::from_env();
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    let store = FilesystemStore::from_config(&config);
    store
        .validate()
        .await
        .with_context(|| format!("data directory {} is not usable", config.data_dir.display()))?;
    info!(data_dir = %config.data_dir.display(), "Page store ready");
    Ok(Arc::new(store))
}

/// Run a sweep first when `PAGEKEY_SWEEP_ON_STARTUP` asks for one.
async fn startup_sweep(store: &Arc<dyn PageStore>) -> anyhow::Result<()> {
    if !SweepConfig::from_env().on_startup {
        return Ok(());
    }
    let coordinator = JobCoordinator::new(CoordinatorConfig::from_env())?;
    let report = run_sweep(store.clone(), &coordinator).await?;
    info!(
        jobs_completed = report.jobs_completed,
        jobs_failed = report.jobs_failed,
        "Startup sweep finished"
    );
    Ok(())
}
