//! Job posting commands.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use super::AppContext;
use crate::models::JobPosting;
use crate::repository::PostingFilter;

#[derive(Subcommand)]
pub enum PostingsCommand {
    /// Store a job posting
    Add {
        title: String,
        company: String,

        #[arg(long, default_value = "")]
        location: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "full-time")]
        job_type: String,

        #[arg(long)]
        salary_min: Option<i64>,

        #[arg(long)]
        salary_max: Option<i64>,

        /// Comma-separated skills
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Search active postings by title, company or description
    Search {
        #[arg(default_value = "")]
        text: String,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        job_type: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

pub async fn run(ctx: &AppContext, cmd: PostingsCommand) -> Result<()> {
    match cmd {
        PostingsCommand::Add {
            title,
            company,
            location,
            description,
            job_type,
            salary_min,
            salary_max,
            skills,
            url,
        } => {
            let mut posting = JobPosting::new(title, company, location, description, job_type);
            posting.salary_min = salary_min;
            posting.salary_max = salary_max;
            posting.skills = skills
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            posting.external_url = url;

            ctx.repos.postings.save(&posting).await?;
            println!("{} Saved posting {}", style("✓").green(), posting.id);
        }
        PostingsCommand::Search {
            text,
            location,
            job_type,
            limit,
        } => {
            let filter = PostingFilter {
                text,
                location,
                job_type,
                limit: Some(limit),
            };
            let postings = ctx.repos.postings.search(&filter).await?;
            if postings.is_empty() {
                println!("{} No matching postings", style("!").yellow());
            }
            for posting in postings {
                print_posting(&posting);
            }
        }
    }
    Ok(())
}

fn print_posting(posting: &JobPosting) {
    let salary = match (posting.salary_min, posting.salary_max) {
        (Some(min), Some(max)) => format!(" {}-{}", min, max),
        (Some(min), None) => format!(" from {}", min),
        (None, Some(max)) => format!(" up to {}", max),
        (None, None) => String::new(),
    };
    println!(
        "{} at {} [{}] {}{}",
        style(&posting.title).bold(),
        style(&posting.company).cyan(),
        posting.job_type,
        posting.location,
        salary
    );
    if !posting.skills.is_empty() {
        println!("  {}", style(posting.skills.join(", ")).dim());
    }
}
