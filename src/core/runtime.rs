//! Main runtime orchestration.
//!
//! The runtime owns every component of a node and their lifecycle:
//! - Start order: snapshot load → cluster (join and sync) → scheduler
//! - Shutdown order: scheduler → cluster → final snapshot

use crate::cluster::{ClusterManager, ClusterSettings, Envelope, NodeState, TcpTransport, Transport};
use crate::core::config::Config;
use crate::core::time::{minutes, Clock, SystemClock};
use crate::scheduler::{jobs, LoggingTransmissionSink, Scheduler, TransmissionSink};
use crate::state::{ExpirationPolicy, Persistence, StateAggregate};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

impl From<NodeState> for ComponentHealth {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Joining | NodeState::Synchronizing => Self::Starting,
            NodeState::Active => Self::Healthy,
            NodeState::Degraded => Self::Degraded,
            NodeState::Stopped => Self::Stopped,
        }
    }
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Snapshot persistence health.
    pub persistence: ComponentHealth,
    /// Cluster manager health.
    pub cluster: ComponentHealth,
    /// Scheduler health.
    pub scheduler: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            persistence: ComponentHealth::Starting,
            cluster: ComponentHealth::Starting,
            scheduler: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the node can serve reads and scheduled broadcasts.
    ///
    /// A degraded cluster still serves reads, so it counts as ready.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.persistence, self.cluster, self.scheduler),
            (
                ComponentHealth::Healthy | ComponentHealth::Degraded,
                ComponentHealth::Healthy | ComponentHealth::Degraded,
                ComponentHealth::Healthy
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        !matches!(
            (self.persistence, self.cluster, self.scheduler),
            (ComponentHealth::Failed, _, _)
                | (_, ComponentHealth::Failed, _)
                | (_, _, ComponentHealth::Failed)
        )
    }
}

/// Node runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// The single state aggregate of this node.
    state: Arc<StateAggregate>,

    /// Snapshot file owner.
    persistence: Arc<Persistence>,

    /// Cluster manager, once started.
    cluster: Option<ClusterManager>,

    /// Periodic jobs.
    scheduler: Scheduler,

    /// Transmission subsystem used by scheduled broadcasts.
    sink: Arc<dyn TransmissionSink>,

    /// Time source for expiry and time broadcasts.
    clock: Arc<dyn Clock>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let persistence = Arc::new(Persistence::new(&config.model.state_file));

        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(StateAggregate::new()),
            persistence,
            cluster: None,
            scheduler: Scheduler::new(),
            sink: Arc::new(LoggingTransmissionSink),
            clock: Arc::new(SystemClock),
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Replace the transmission sink. Must be called before start.
    pub fn with_sink(mut self, sink: Arc<dyn TransmissionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the clock. Must be called before start.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared state aggregate.
    pub fn state(&self) -> &Arc<StateAggregate> {
        &self.state
    }

    /// Snapshot persistence.
    pub fn persistence(&self) -> &Arc<Persistence> {
        &self.persistence
    }

    /// Cluster manager (if started).
    pub fn cluster(&self) -> Option<&ClusterManager> {
        self.cluster.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Current health, with the cluster entry read live.
    pub fn health(&self) -> RuntimeHealth {
        let mut health = self.health.clone();
        if let Some(cluster) = &self.cluster {
            health.cluster = cluster.node_state().into();
        }
        if self.persistence.consecutive_failures() > 0 {
            health.persistence = ComponentHealth::Degraded;
        }
        health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health().is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health().is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Bind the TCP peer transport and start all components.
    pub async fn start(&mut self) -> Result<()> {
        let peers = self
            .config
            .cluster
            .peers
            .iter()
            .map(|peer| (peer.name.clone(), peer.address.clone()))
            .collect::<Vec<_>>();
        let (transport, inbound) =
            TcpTransport::bind(&self.config.node.name, &self.config.cluster.bind, peers).await?;
        self.start_with_transport(Arc::new(transport), inbound).await
    }

    /// Start all components on an already connected transport.
    ///
    /// Components are started in order:
    /// 1. Cluster manager (snapshot load, join, synchronization)
    /// 2. Scheduler
    pub async fn start_with_transport(
        &mut self,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> Result<()> {
        tracing::info!(
            node = %self.config.node.name,
            state_file = %self.persistence.path().display(),
            "starting pagenet runtime"
        );

        // 1. Cluster
        self.health.persistence = ComponentHealth::Healthy;
        let settings = ClusterSettings::from_config(&self.config);
        let cluster = ClusterManager::new(
            settings,
            self.state.clone(),
            transport,
            Some(self.persistence.clone()),
        );
        if let Err(err) = cluster.start(inbound).await {
            self.health.cluster = ComponentHealth::Failed;
            return Err(err).context("cluster startup failed");
        }
        self.health.cluster = ComponentHealth::Healthy;
        self.cluster = Some(cluster);

        // 2. Scheduler
        self.init_scheduler();

        self.running.store(true, Ordering::Release);
        tracing::info!(node = %self.config.node.name, "pagenet runtime started");
        Ok(())
    }

    fn init_scheduler(&mut self) {
        let model = &self.config.model;
        let policy = ExpirationPolicy {
            call: minutes(model.call_expiration_minutes),
            news: minutes(model.news_expiration_minutes),
            activation: minutes(model.activation_expiration_minutes),
        };
        for job in jobs::standard_jobs(
            &self.config.scheduler,
            self.state.clone(),
            self.persistence.clone(),
            self.sink.clone(),
            self.clock.clone(),
            policy,
        ) {
            self.scheduler.register(job);
        }
        self.scheduler.start();
        self.health.scheduler = ComponentHealth::Healthy;
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the runtime until ctrl-c or a shutdown request.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components.
    ///
    /// Components are stopped in order:
    /// 1. Scheduler
    /// 2. Cluster manager (graceful)
    /// 3. Final snapshot
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping pagenet runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        // 1. Scheduler
        self.health.scheduler = ComponentHealth::Stopping;
        self.scheduler.stop().await;
        self.health.scheduler = ComponentHealth::Stopped;

        // 2. Cluster
        if let Some(cluster) = &self.cluster {
            self.health.cluster = ComponentHealth::Stopping;
            cluster.stop().await;
            self.health.cluster = ComponentHealth::Stopped;
        }

        // 3. Final snapshot
        self.health.persistence = ComponentHealth::Stopping;
        if !self.persistence.save(&self.state) {
            tracing::warn!("final snapshot could not be written");
        }
        self.health.persistence = ComponentHealth::Stopped;

        tracing::info!("pagenet runtime stopped");
        Ok(())
    }
}
