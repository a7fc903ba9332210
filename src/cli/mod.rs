//! Operator command line for jobscout.

mod jobs;
mod postings;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{load_settings, Settings};
use crate::feed::ChangeFeed;
use crate::rate_limit::{create_backend, RateLimitBackend};
use crate::repository::Repositories;
use crate::services::{DispatchService, SummaryService};

#[derive(Parser)]
#[command(name = "jobscout")]
#[command(about = "Dispatch and track job-board scrape jobs")]
#[command(version)]
struct Cli {
    /// Database file (overrides config)
    #[arg(long, global = true, env = "JOBSCOUT_DATABASE")]
    database: Option<PathBuf>,

    /// User the commands act for
    #[arg(long, global = true, env = "JOBSCOUT_OWNER", default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage job sources
    #[command(subcommand)]
    Sources(sources::SourcesCommand),

    /// Create one scrape job per active source for a search
    Dispatch(jobs::DispatchArgs),

    /// Show scrape job counts and the most recent jobs
    Summary {
        /// Number of recent jobs to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print a fresh summary whenever a scrape job changes (Ctrl-C to stop)
    Watch {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Worker-side scrape job transitions
    #[command(subcommand)]
    Job(jobs::JobCommand),

    /// Store and search job postings
    #[command(subcommand)]
    Postings(postings::PostingsCommand),
}

/// Everything a command needs, opened once per invocation.
pub(crate) struct AppContext {
    pub settings: Settings,
    pub owner: String,
    pub repos: Repositories,
    pub limiter: Arc<dyn RateLimitBackend>,
}

impl AppContext {
    async fn open(settings: Settings, owner: String) -> Result<Self> {
        settings
            .ensure_directories()
            .context("Failed to create data directory")?;

        let db_path = settings.database_path();
        let feed = ChangeFeed::with_capacity(settings.change_feed_capacity);
        let repos = Repositories::open(&db_path, feed)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        let limiter = create_backend(
            settings.rate_limit_backend.as_deref(),
            &db_path,
            settings.rate_limit_window_secs,
        )?;

        Ok(Self {
            settings,
            owner,
            repos,
            limiter,
        })
    }

    pub fn dispatcher(&self) -> DispatchService {
        DispatchService::new(&self.repos, self.limiter.clone())
    }

    pub fn summaries(&self) -> SummaryService {
        SummaryService::new(self.repos.scrape_jobs.clone())
            .with_recent_limit(self.settings.recent_jobs_limit)
    }
}

/// Relative paths given on the command line are relative to the working
/// directory, not to the data directory.
fn resolve_from_cwd(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    Ok(cwd.join(path))
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings().await;
    if let Some(database) = cli.database {
        settings.database_filename = resolve_from_cwd(database)?.display().to_string();
    }

    let ctx = AppContext::open(settings, cli.owner).await?;

    match cli.command {
        Commands::Sources(cmd) => sources::run(&ctx, cmd).await,
        Commands::Dispatch(args) => jobs::run_dispatch(&ctx, args).await,
        Commands::Summary { limit, json } => jobs::run_summary(&ctx, limit, json).await,
        Commands::Watch { limit } => jobs::run_watch(&ctx, limit).await,
        Commands::Job(cmd) => jobs::run_job(&ctx, cmd).await,
        Commands::Postings(cmd) => postings::run(&ctx, cmd).await,
    }
}
