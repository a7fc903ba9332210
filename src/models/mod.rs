//! Domain models for job sources, search queries, scrape jobs and postings.
//!
//! These are the typed records the pipeline works with. Repositories convert
//! database rows into these before anything else sees them.

mod job_posting;
mod scrape_job;
mod search_query;
mod source;

pub use job_posting::JobPosting;
pub use scrape_job::{InvalidTransition, ScrapeJob, ScrapeJobStatus, ScrapeJobView};
pub use search_query::{SearchIntent, SearchQuery};
pub use source::{Source, DEFAULT_RATE_LIMIT_PER_HOUR};
