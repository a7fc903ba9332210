//! jobscout: scrape-job orchestration and status aggregation.
//!
//! A search query fans out into one pending scrape job per active job
//! source, rate-limited per user and source. Job rows are summarized for
//! display and re-summarized whenever the change feed reports a change.

pub mod cli;
pub mod config;
pub mod feed;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod services;
