//! Source registry commands.

use anyhow::{bail, Result};
use clap::Subcommand;
use console::style;

use super::AppContext;
use crate::models::{Source, DEFAULT_RATE_LIMIT_PER_HOUR};

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// Register a job source
    Add {
        /// Display name (e.g. LinkedIn)
        name: String,

        /// Base URL of the job board
        base_url: String,

        /// Dispatches allowed per user per hour
        #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_PER_HOUR)]
        rate_limit: u32,

        /// Stable id (generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Register the source as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// List registered sources
    List,

    /// Include a source in dispatches
    Activate { id: String },

    /// Exclude a source from dispatches
    Deactivate { id: String },

    /// Remove a source (existing scrape jobs are kept)
    Remove { id: String },
}

pub async fn run(ctx: &AppContext, cmd: SourcesCommand) -> Result<()> {
    match cmd {
        SourcesCommand::Add {
            name,
            base_url,
            rate_limit,
            id,
            inactive,
        } => add(ctx, name, base_url, rate_limit, id, inactive).await,
        SourcesCommand::List => list(ctx).await,
        SourcesCommand::Activate { id } => set_active(ctx, &id, true).await,
        SourcesCommand::Deactivate { id } => set_active(ctx, &id, false).await,
        SourcesCommand::Remove { id } => remove(ctx, &id).await,
    }
}

async fn add(
    ctx: &AppContext,
    name: String,
    base_url: String,
    rate_limit: u32,
    id: Option<String>,
    inactive: bool,
) -> Result<()> {
    let mut source = Source::new(name, base_url).with_rate_limit(rate_limit);
    if let Err(e) = source.parsed_url() {
        bail!("Invalid base URL '{}': {}", source.base_url, e);
    }
    if let Some(id) = id {
        source = source.with_id(id);
    }
    if inactive {
        source = source.inactive();
    }

    ctx.repos.sources.save(&source).await?;
    println!(
        "{} Added source {} ({})",
        style("✓").green(),
        style(&source.name).cyan(),
        source.id
    );
    Ok(())
}

async fn list(ctx: &AppContext) -> Result<()> {
    let sources = ctx.repos.sources.get_all().await?;
    if sources.is_empty() {
        println!("{} No sources registered", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<38} {:<16} {:<8} {:>6}  {}",
        style("ID").bold(),
        style("Name").bold(),
        style("Active").bold(),
        style("Limit").bold(),
        style("URL").bold()
    );
    for source in sources {
        let active = if source.is_active {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!(
            "{:<38} {:<16} {:<8} {:>6}  {}",
            source.id, source.name, active, source.rate_limit_per_hour, source.base_url
        );
    }
    Ok(())
}

async fn set_active(ctx: &AppContext, id: &str, active: bool) -> Result<()> {
    if !ctx.repos.sources.set_active(id, active).await? {
        bail!("Source not found: {}", id);
    }
    let state = if active { "activated" } else { "deactivated" };
    println!("{} Source {} {}", style("✓").green(), id, state);
    Ok(())
}

async fn remove(ctx: &AppContext, id: &str) -> Result<()> {
    if !ctx.repos.sources.delete(id).await? {
        bail!("Source not found: {}", id);
    }
    println!("{} Removed source {}", style("✓").green(), id);
    Ok(())
}
