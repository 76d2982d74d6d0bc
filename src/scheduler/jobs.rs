//! Periodic job constructors.
//!
//! Each job closes over exactly the collaborators it needs and takes the
//! lock class its work requires.

use super::transmission::TransmissionSink;
use super::Job;
use crate::core::config::SchedulerConfig;
use crate::core::time::Clock;
use crate::state::{ExpirationPolicy, Persistence, StateAggregate};
use std::sync::Arc;
use std::time::Duration;

/// Broadcast the current time. Takes no lock.
pub fn time_job(period: Duration, sink: Arc<dyn TransmissionSink>, clock: Arc<dyn Clock>) -> Job {
    Job::new("time", period, move || sink.handle_time(clock.now()))
}

/// Broadcast every rubric under the read lock.
pub fn rubric_names_job(
    period: Duration,
    state: Arc<StateAggregate>,
    sink: Arc<dyn TransmissionSink>,
) -> Job {
    Job::new("rubric_names", period, move || {
        let sent = state.with_read_lock(|state| {
            for rubric in state.rubrics.values() {
                sink.send_rubric(rubric);
            }
            state.rubrics.len()
        });
        tracing::debug!(rubrics = sent, "rubric names sent");
    })
}

/// Broadcast every news slot of every rubric under the read lock.
pub fn news_job(
    period: Duration,
    state: Arc<StateAggregate>,
    sink: Arc<dyn TransmissionSink>,
) -> Job {
    Job::new("news", period, move || {
        let sent = state.with_read_lock(|state| {
            let mut sent = 0;
            for (key, list) in state.news.iter() {
                let Some(rubric) = state.rubrics.get(key) else {
                    continue;
                };
                for news in list.items() {
                    sink.send_news(rubric, news);
                    sent += 1;
                }
            }
            sent
        });
        tracing::debug!(news = sent, "news sent");
    })
}

/// Broadcast transmitter identification. Takes no lock.
pub fn identification_job(period: Duration, sink: Arc<dyn TransmissionSink>) -> Job {
    Job::new("identification", period, move || sink.handle_identification())
}

/// Write a snapshot; serialization happens under the read lock.
pub fn state_saving_job(
    period: Duration,
    state: Arc<StateAggregate>,
    persistence: Arc<Persistence>,
) -> Job {
    Job::new("state_saving", period, move || {
        persistence.save(&state);
    })
}

/// Remove expired entities under the write lock, then save.
pub fn state_cleaning_job(
    period: Duration,
    state: Arc<StateAggregate>,
    persistence: Arc<Persistence>,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
) -> Job {
    Job::new("state_cleaning", period, move || {
        let report = state.clean(clock.now(), &policy);
        tracing::info!(
            calls = report.calls,
            news = report.news,
            activations = report.activations,
            "state cleaned"
        );
        persistence.save(&state);
    })
}

/// The standard job set of a running node.
pub fn standard_jobs(
    config: &SchedulerConfig,
    state: Arc<StateAggregate>,
    persistence: Arc<Persistence>,
    sink: Arc<dyn TransmissionSink>,
    clock: Arc<dyn Clock>,
    policy: ExpirationPolicy,
) -> Vec<Job> {
    let seconds = Duration::from_secs;
    vec![
        time_job(seconds(config.time), sink.clone(), clock.clone()),
        rubric_names_job(seconds(config.rubric_names), state.clone(), sink.clone()),
        news_job(seconds(config.news), state.clone(), sink.clone()),
        identification_job(seconds(config.identification), sink),
        state_saving_job(seconds(config.state_saving), state.clone(), persistence.clone()),
        state_cleaning_job(
            seconds(config.state_cleaning),
            state,
            persistence,
            policy,
            clock,
        ),
    ]
}
