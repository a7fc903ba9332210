//! End-to-end tests for dispatch, rate limiting and summaries against a
//! temporary SQLite database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobscout::feed::{ChangeFeed, ScrapeJobChange};
use jobscout::models::{ScrapeJobStatus, SearchIntent, Source};
use jobscout::rate_limit::{create_backend, RateLimitBackend};
use jobscout::repository::{Repositories, TransitionError};
use jobscout::services::{
    DispatchError, DispatchService, JobSummary, SkipReason, SummaryService,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    repos: Repositories,
    limiter: Arc<dyn RateLimitBackend>,
    dispatcher: DispatchService,
    summaries: SummaryService,
    _dir: TempDir,
}

async fn harness(backend: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobscout.db");
    let repos = Repositories::open(&db_path, ChangeFeed::new()).await.unwrap();
    let limiter = create_backend(Some(backend), &db_path, 3600).unwrap();
    let dispatcher = DispatchService::new(&repos, limiter.clone());
    let summaries = SummaryService::new(repos.scrape_jobs.clone());
    Harness {
        repos,
        limiter,
        dispatcher,
        summaries,
        _dir: dir,
    }
}

/// LinkedIn and Indeed active at 10/hour, Glassdoor inactive.
async fn seed_job_boards(repos: &Repositories) {
    let boards = [
        Source::new("LinkedIn".into(), "https://www.linkedin.com/jobs".into())
            .with_id("linkedin")
            .with_rate_limit(10),
        Source::new("Indeed".into(), "https://www.indeed.com".into())
            .with_id("indeed")
            .with_rate_limit(10),
        Source::new("Glassdoor".into(), "https://www.glassdoor.com".into())
            .with_id("glassdoor")
            .inactive(),
    ];
    for board in &boards {
        repos.sources.save(board).await.unwrap();
    }
}

#[tokio::test]
async fn dispatch_creates_one_pending_job_per_active_source() {
    for backend in ["memory", "sqlite"] {
        let h = harness(backend).await;
        seed_job_boards(&h.repos).await;

        let outcome = h
            .dispatcher
            .dispatch(&SearchIntent::new("React Developer"), "user-1")
            .await
            .unwrap();

        assert_eq!(outcome.jobs.len(), 2, "backend {}", backend);
        assert!(outcome.skipped.is_empty());
        let mut sources: Vec<_> = outcome
            .jobs
            .iter()
            .map(|j| j.source_id.clone().unwrap())
            .collect();
        sources.sort();
        assert_eq!(sources, vec!["indeed", "linkedin"]);
        assert!(outcome.jobs.iter().all(|j| j.status == ScrapeJobStatus::Pending));

        for source in ["linkedin", "indeed"] {
            let window = h.limiter.window("user-1", source).await.unwrap().unwrap();
            assert_eq!(window.requests_count, 1);
        }
        assert!(h.limiter.window("user-1", "glassdoor").await.unwrap().is_none());
        assert_eq!(h.repos.scrape_jobs.count_for_owner("user-1").await.unwrap(), 2);
    }
}

#[tokio::test]
async fn exhausted_source_is_skipped_as_rate_limited() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    let now = Utc::now();
    for _ in 0..10 {
        h.limiter
            .check_and_increment("user-1", "linkedin", 10, now)
            .await
            .unwrap();
    }

    let outcome = h
        .dispatcher
        .dispatch_at(&SearchIntent::new("React Developer"), "user-1", now)
        .await
        .unwrap();

    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(outcome.jobs[0].source_id.as_deref(), Some("indeed"));
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].source_id, "linkedin");
    assert!(matches!(
        outcome.skipped[0].reason,
        SkipReason::RateLimited { limit: 10, used: 10, .. }
    ));
    let window = h.limiter.window("user-1", "linkedin").await.unwrap().unwrap();
    assert_eq!(window.requests_count, 10);
}

#[tokio::test]
async fn limit_plus_one_dispatches_yield_one_skip() {
    let h = harness("sqlite").await;
    let source = Source::new("Indeed".into(), "https://www.indeed.com".into())
        .with_id("indeed")
        .with_rate_limit(3);
    h.repos.sources.save(&source).await.unwrap();

    let mut created = 0;
    let mut skipped = 0;
    for i in 0..4 {
        let outcome = h
            .dispatcher
            .dispatch(&SearchIntent::new(format!("query {}", i)), "user-1")
            .await
            .unwrap();
        created += outcome.jobs.len();
        skipped += outcome.skipped.len();
    }

    assert_eq!(created, 3);
    assert_eq!(skipped, 1);
    let window = h.limiter.window("user-1", "indeed").await.unwrap().unwrap();
    assert_eq!(window.requests_count, 3);
    assert_eq!(h.repos.scrape_jobs.count_for_owner("user-1").await.unwrap(), 3);
}

#[tokio::test]
async fn rate_limits_are_per_owner() {
    let h = harness("memory").await;
    let source = Source::new("Indeed".into(), "https://www.indeed.com".into())
        .with_id("indeed")
        .with_rate_limit(1);
    h.repos.sources.save(&source).await.unwrap();

    let intent = SearchIntent::new("Rust");
    assert_eq!(h.dispatcher.dispatch(&intent, "user-1").await.unwrap().jobs.len(), 1);
    assert_eq!(h.dispatcher.dispatch(&intent, "user-1").await.unwrap().jobs.len(), 0);
    assert_eq!(h.dispatcher.dispatch(&intent, "user-2").await.unwrap().jobs.len(), 1);
}

#[tokio::test]
async fn empty_query_creates_nothing() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    let err = h
        .dispatcher
        .dispatch(&SearchIntent::new("  \t "), "user-1")
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidQuery));
    assert_eq!(h.repos.queries.count_for_owner("user-1").await.unwrap(), 0);
    assert_eq!(h.repos.scrape_jobs.count_for_owner("user-1").await.unwrap(), 0);
    assert!(h.limiter.window("user-1", "linkedin").await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_dispatch_reuses_search_query() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;
    let intent = SearchIntent::new("React Developer").with_location("Berlin");

    let first = h.dispatcher.dispatch(&intent, "user-1").await.unwrap();
    let second = h.dispatcher.dispatch(&intent, "user-1").await.unwrap();

    assert_eq!(first.search_query.id, second.search_query.id);
    assert_eq!(h.repos.queries.count_for_owner("user-1").await.unwrap(), 1);
    assert_eq!(h.repos.scrape_jobs.count_for_owner("user-1").await.unwrap(), 4);
    assert!(second.search_query.last_run_at >= first.search_query.last_run_at);
}

#[tokio::test]
async fn summary_reflects_worker_transitions() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    let outcome = h
        .dispatcher
        .dispatch(&SearchIntent::new("React Developer"), "user-1")
        .await
        .unwrap();
    let (a, b) = (&outcome.jobs[0], &outcome.jobs[1]);

    h.repos.scrape_jobs.mark_running(&a.id).await.unwrap();
    h.repos.scrape_jobs.mark_completed(&a.id, 17).await.unwrap();
    h.repos.scrape_jobs.mark_failed(&b.id, "captcha").await.unwrap();

    let summary = h.summaries.summarize("user-1", 5).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.jobs_found, 17);
    assert_eq!(
        summary.pending + summary.running + summary.completed + summary.failed,
        summary.total
    );
    assert!(summary
        .recent
        .iter()
        .all(|v| v.query_text.as_deref() == Some("React Developer")));

    let err = h.repos.scrape_jobs.mark_running(&a.id).await.unwrap_err();
    assert!(matches!(err, TransitionError::InvalidTransition(_)));

    // Pure: summarizing the same snapshot twice gives the same answer.
    let views = h.repos.scrape_jobs.list_for_owner("user-1").await.unwrap();
    assert_eq!(JobSummary::from_views(&views, 5), JobSummary::from_views(&views, 5));
    assert_eq!(h.summaries.summarize("user-2", 5).await.unwrap().total, 0);
}

#[tokio::test]
async fn subscribers_see_dispatch_and_stop_after_unsubscribe() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = h.summaries.subscribe("user-1", move |change| {
        let _ = tx.send(change);
    });

    h.dispatcher
        .dispatch(&SearchIntent::new("React Developer"), "user-1")
        .await
        .unwrap();

    for _ in 0..2 {
        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(change, ScrapeJobChange::Inserted(_)));
    }

    subscription.unsubscribe();
    h.dispatcher
        .dispatch(&SearchIntent::new("Rust"), "user-1")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn watch_summary_delivers_fresh_totals() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = h.summaries.watch_summary("user-1", 5, move |summary| {
        let _ = tx.send(summary);
    });

    h.dispatcher
        .dispatch(&SearchIntent::new("React Developer"), "user-1")
        .await
        .unwrap();

    let mut latest = JobSummary::default();
    while latest.total < 2 {
        latest = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(latest.pending, 2);
}

#[tokio::test]
async fn deleting_source_keeps_jobs() {
    let h = harness("memory").await;
    seed_job_boards(&h.repos).await;

    h.dispatcher
        .dispatch(&SearchIntent::new("React Developer"), "user-1")
        .await
        .unwrap();
    assert!(h.repos.sources.delete("linkedin").await.unwrap());

    let views = h.repos.scrape_jobs.list_for_owner("user-1").await.unwrap();
    assert_eq!(views.len(), 2);
    let orphaned: Vec<_> = views.iter().filter(|v| v.source_name.is_none()).collect();
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].job.source_id.as_deref(), Some("linkedin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_never_exceed_limit() {
    let h = harness("sqlite").await;
    let source = Source::new("Indeed".into(), "https://www.indeed.com".into())
        .with_id("indeed")
        .with_rate_limit(3);
    h.repos.sources.save(&source).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = h.dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher
                .dispatch(&SearchIntent::new(format!("query {}", i)), "user-1")
                .await
        }));
    }

    let mut created = 0;
    let mut skipped = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        created += outcome.jobs.len();
        skipped += outcome.skipped.len();
    }

    assert_eq!(created, 3);
    assert_eq!(skipped, 5);
    let window = h.limiter.window("user-1", "indeed").await.unwrap().unwrap();
    assert_eq!(window.requests_count, 3);
    assert_eq!(h.repos.scrape_jobs.count_for_owner("user-1").await.unwrap(), 3);
}
