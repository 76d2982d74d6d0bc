//! Periodic jobs.
//!
//! - [`transmission`] - Sink trait for scheduled broadcasts
//! - [`jobs`] - Constructors for the standard job set
//!
//! Every job runs on its own `tokio` interval. Missed ticks are skipped, not
//! replayed, and the first run happens one period after start.

pub mod jobs;
pub mod transmission;

pub use transmission::{LoggingTransmissionSink, TransmissionSink};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// A named periodic task.
#[derive(Clone)]
pub struct Job {
    name: &'static str,
    period: Duration,
    task: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    pub fn new(
        name: &'static str,
        period: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            period,
            task: Arc::new(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run the task once on the calling thread.
    pub fn run(&self) {
        (self.task)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish()
    }
}

/// Owner of the running job tasks.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<Job>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
        }
    }

    /// Add a job. Jobs registered after [`Scheduler::start`] are not started.
    pub fn register(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Run a registered job immediately. Returns false if no job has that name.
    pub fn run_now(&self, name: &str) -> bool {
        match self.jobs.iter().find(|job| job.name == name) {
            Some(job) => {
                job.run();
                true
            }
            None => false,
        }
    }

    /// Spawn one interval task per job.
    pub fn start(&mut self) {
        for job in &self.jobs {
            let job = job.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + job.period, job.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            tracing::debug!(job = job.name, "running scheduled job");
                            job.run();
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            });
            self.handles.push(handle);
        }
        tracing::info!(jobs = self.jobs.len(), "scheduler started");
    }

    /// Signal every job task and wait for them to exit.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "scheduled job task failed");
            }
        }
        tracing::info!("scheduler stopped");
    }
}
