//! Dispatch, summary and worker transition commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;

use super::AppContext;
use crate::models::{ScrapeJob, ScrapeJobStatus, ScrapeJobView, SearchIntent};
use crate::services::{DispatchOutcome, JobSummary, SkipReason};

#[derive(Args)]
pub struct DispatchArgs {
    /// Search keywords
    query: String,

    #[arg(long)]
    location: Option<String>,

    /// Job type (e.g. full-time, contract)
    #[arg(long)]
    job_type: Option<String>,

    /// Salary band (free text)
    #[arg(long)]
    salary_range: Option<String>,

    /// Print JSON instead of a report
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Mark a pending job as running
    Start { id: String },

    /// Mark a job as completed
    Complete {
        id: String,

        /// Number of postings the scrape found
        #[arg(long, default_value_t = 0)]
        jobs_found: u32,
    },

    /// Mark a job as failed
    Fail {
        id: String,

        /// Failure reason
        #[arg(long)]
        error: String,
    },

    /// List the oldest pending jobs
    Pending {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

fn status_style(status: ScrapeJobStatus) -> console::StyledObject<&'static str> {
    let label = status.as_str();
    match status {
        ScrapeJobStatus::Pending => style(label).yellow(),
        ScrapeJobStatus::Running => style(label).cyan(),
        ScrapeJobStatus::Completed => style(label).green(),
        ScrapeJobStatus::Failed => style(label).red(),
    }
}

pub async fn run_dispatch(ctx: &AppContext, args: DispatchArgs) -> Result<()> {
    let mut intent = SearchIntent::new(args.query);
    intent.location = args.location;
    intent.job_type = args.job_type;
    intent.salary_range = args.salary_range;

    let outcome = ctx.dispatcher().dispatch(&intent, &ctx.owner).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &DispatchOutcome) {
    println!(
        "{} Dispatched \"{}\" ({})",
        style("→").cyan(),
        style(&outcome.search_query.query_text).bold(),
        outcome.search_query.id
    );
    for job in &outcome.jobs {
        println!(
            "  {} {} source={}",
            status_style(job.status),
            job.id,
            job.source_id.as_deref().unwrap_or("-")
        );
    }
    for skip in &outcome.skipped {
        match skip.reason {
            SkipReason::RateLimited {
                limit,
                used,
                resets_at,
            } => println!(
                "  {} {} rate limited ({}/{}, resets {})",
                style("skipped").yellow(),
                skip.source_name,
                used,
                limit,
                resets_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
    println!(
        "{} {} job(s) created, {} source(s) skipped",
        style("✓").green(),
        outcome.jobs.len(),
        outcome.skipped.len()
    );
}

pub async fn run_summary(ctx: &AppContext, limit: Option<usize>, json: bool) -> Result<()> {
    let summaries = ctx.summaries();
    let limit = limit.unwrap_or(summaries.recent_limit());
    let summary = summaries.summarize(&ctx.owner, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &JobSummary) {
    println!("{}", style("Scrape jobs").bold());
    println!(
        "  total {}  pending {}  running {}  completed {}  failed {}",
        summary.total,
        style(summary.pending).yellow(),
        style(summary.running).cyan(),
        style(summary.completed).green(),
        style(summary.failed).red()
    );
    println!("  postings found: {}", summary.jobs_found);

    if summary.recent.is_empty() {
        return;
    }
    println!("{}", style("Recent").bold());
    for view in &summary.recent {
        print_view(view);
    }
}

fn print_view(view: &ScrapeJobView) {
    let query = match (&view.query_text, &view.query_location) {
        (Some(text), Some(location)) => format!("{} @ {}", text, location),
        (Some(text), None) => text.clone(),
        (None, _) => "(deleted query)".to_string(),
    };
    println!(
        "  {:<10} {:<16} {:<32} {}",
        status_style(view.job.status),
        view.source_name.as_deref().unwrap_or("(deleted source)"),
        query,
        view.job.created_at.format("%Y-%m-%d %H:%M")
    );
}

pub async fn run_watch(ctx: &AppContext, limit: Option<usize>) -> Result<()> {
    let summaries = ctx.summaries();
    let limit = limit.unwrap_or(summaries.recent_limit());

    print_summary(&summaries.summarize(&ctx.owner, limit).await?);
    println!("{}", style("Watching for changes (Ctrl-C to stop)").dim());

    let subscription = summaries.watch_summary(&ctx.owner, limit, |summary| {
        println!();
        print_summary(&summary);
    });

    tokio::signal::ctrl_c().await?;
    subscription.unsubscribe();
    Ok(())
}

fn print_job(job: &ScrapeJob) {
    println!(
        "{} {} is now {}",
        style("✓").green(),
        job.id,
        status_style(job.status)
    );
}

pub async fn run_job(ctx: &AppContext, cmd: JobCommand) -> Result<()> {
    let repo = &ctx.repos.scrape_jobs;
    match cmd {
        JobCommand::Start { id } => print_job(&repo.mark_running(&id).await?),
        JobCommand::Complete { id, jobs_found } => {
            print_job(&repo.mark_completed(&id, jobs_found).await?)
        }
        JobCommand::Fail { id, error } => print_job(&repo.mark_failed(&id, &error).await?),
        JobCommand::Pending { limit } => {
            let jobs = repo.pending(limit).await?;
            if jobs.is_empty() {
                println!("{} No pending jobs", style("!").yellow());
            }
            for job in jobs {
                println!(
                    "{} owner={} query={} source={} created={}",
                    job.id,
                    job.owner_id,
                    job.search_query_id.as_deref().unwrap_or("-"),
                    job.source_id.as_deref().unwrap_or("-"),
                    job.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}
