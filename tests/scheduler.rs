//! Scheduler and periodic job tests.

mod common;

use common::{epoch, minutes, populated_state, RecordingSink};
use pagenet::core::config::SchedulerConfig;
use pagenet::core::time::{Clock, ManualClock};
use pagenet::scheduler::jobs::{
    identification_job, news_job, rubric_names_job, standard_jobs, state_cleaning_job,
    state_saving_job, time_job,
};
use pagenet::scheduler::{Job, Scheduler, TransmissionSink};
use pagenet::state::{ExpirationPolicy, Persistence, StateAggregate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixtures() -> (Arc<StateAggregate>, Arc<RecordingSink>, Arc<ManualClock>) {
    (
        Arc::new(StateAggregate::from_state(populated_state())),
        Arc::new(RecordingSink::default()),
        Arc::new(ManualClock::new(epoch())),
    )
}

// ============================================================================
// Jobs
// ============================================================================

#[test]
fn broadcast_jobs_reach_the_sink() {
    let (state, sink, clock) = fixtures();
    let period = Duration::from_secs(60);

    time_job(period, sink.clone(), clock.clone()).run();
    rubric_names_job(period, state.clone(), sink.clone()).run();
    news_job(period, state, sink.clone()).run();
    identification_job(period, sink.clone()).run();

    assert_eq!(
        sink.events(),
        vec![
            format!("time:{}", epoch().timestamp()),
            "rubric:weather".to_string(),
            "news:weather:1".to_string(),
            "identification".to_string(),
        ]
    );
}

#[test]
fn saving_job_writes_snapshot() {
    let dir = TempDir::new().unwrap();
    let (state, _, _) = fixtures();
    let persistence = Arc::new(Persistence::new(dir.path().join("state.json")));

    state_saving_job(Duration::from_secs(60), state, persistence.clone()).run();

    let loaded = persistence.load_snapshot().unwrap().unwrap();
    assert_eq!(loaded.version, 9);
}

#[test]
fn cleaning_job_expires_and_saves() {
    let dir = TempDir::new().unwrap();
    let (state, _, clock) = fixtures();
    let persistence = Arc::new(Persistence::new(dir.path().join("state.json")));
    let job = state_cleaning_job(
        Duration::from_secs(60),
        state.clone(),
        persistence.clone(),
        ExpirationPolicy::default(),
        clock.clone(),
    );

    job.run();
    assert_eq!(state.with_read_lock(|s| s.calls.len()), 1);

    clock.advance(minutes(1441));
    job.run();
    state.with_read_lock(|s| {
        assert!(s.calls.is_empty());
        assert!(s.activations.is_empty());
        assert!(s.news.get("weather").unwrap().is_empty());
    });

    let loaded = persistence.load_snapshot().unwrap().unwrap();
    assert!(loaded.calls.is_empty());
}

#[test]
fn standard_job_set() {
    let dir = TempDir::new().unwrap();
    let (state, sink, clock) = fixtures();
    let config = SchedulerConfig::default();
    let jobs = standard_jobs(
        &config,
        state,
        Arc::new(Persistence::new(dir.path().join("state.json"))),
        sink as Arc<dyn TransmissionSink>,
        clock as Arc<dyn Clock>,
        ExpirationPolicy::default(),
    );

    let names: Vec<&str> = jobs.iter().map(Job::name).collect();
    assert_eq!(
        names,
        ["time", "rubric_names", "news", "identification", "state_saving", "state_cleaning"]
    );
    assert_eq!(jobs[0].period(), Duration::from_secs(1200));
    assert_eq!(jobs[5].period(), Duration::from_secs(86_400));
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn run_now_by_name() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new("count", Duration::from_secs(3600), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(scheduler.run_now("count"));
    assert!(!scheduler.run_now("missing"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn jobs_run_periodically_until_stopped() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new("count", Duration::from_millis(20), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    scheduler.start();
    // First run happens one period after start.
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await;
    let stopped_at = runs.load(Ordering::SeqCst);
    assert!(stopped_at >= 2, "only {} runs", stopped_at);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(runs.load(Ordering::SeqCst), stopped_at);
}
