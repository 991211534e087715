//! Driver lifecycle controller.
//!
//! The driver moves through
//! `Init -> Parsing -> Planning -> Serving -> Running -> ShuttingDown -> Exited`.
//! Any failure before `Running` skips straight to `ShuttingDown`. Signals
//! and the serve timeout are delivered as [`ShutdownReason`] messages so that
//! every path ends in the same [`Driver::teardown`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rdzv_core::{
    get_host_assignments, AllocationPlan, DiscoveryPublisher, DriverConfig, HttpRendezvousServer,
    RendezvousEndpoint, RendezvousError, WorkerEnv,
};

use crate::signals;

/// Lifecycle phases of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Parsing,
    Planning,
    Serving,
    Running,
    ShuttingDown,
    Exited,
}

/// Startup step that failed, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    ParseWorkerList,
    PlanAllocation,
    StartEndpoint,
    InitEndpoint,
    PublishArtifact,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            StartupStage::ParseWorkerList => "parsing worker list",
            StartupStage::PlanAllocation => "planning host allocation",
            StartupStage::StartEndpoint => "starting rendezvous endpoint",
            StartupStage::InitEndpoint => "initializing rendezvous endpoint",
            StartupStage::PublishArtifact => "publishing discovery artifact",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
#[error("startup failed while {stage}: {source}")]
pub struct StartupError {
    pub stage: StartupStage,
    #[source]
    pub source: RendezvousError,
}

/// Why the driver is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    IllegalInstruction,
    ServeTimeout,
}

/// Final outcome of a driver run.
#[derive(Debug)]
pub enum DriverExit {
    Graceful(ShutdownReason),
    StartupFailed(StartupError),
}

impl DriverExit {
    /// Process exit code: 0 for graceful shutdown, 1 for startup failure.
    pub fn code(&self) -> u8 {
        match self {
            DriverExit::Graceful(_) => 0,
            DriverExit::StartupFailed(_) => 1,
        }
    }
}

/// Sends shutdown requests into a running driver.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownHandle {
    /// Request shutdown. Non-blocking; extra requests after the first are
    /// dropped.
    pub fn trigger(&self, reason: ShutdownReason) {
        if self.tx.try_send(reason).is_ok() {
            info!(?reason, "Shutdown requested");
        }
    }
}

/// Coordinates parsing, planning, serving and teardown for one job.
pub struct Driver {
    config: DriverConfig,
    endpoint: Box<dyn RendezvousEndpoint>,
    publisher: DiscoveryPublisher,
    phase: Phase,
    port: Option<u16>,
    plan: Option<AllocationPlan>,
    install_signal_handlers: bool,
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    shutdown_rx: mpsc::Receiver<ShutdownReason>,
}

impl Driver {
    /// Create a driver serving the plan over HTTP.
    pub fn new(config: DriverConfig) -> Self {
        let endpoint = HttpRendezvousServer::new(config.endpoint.clone(), config.worker.clone())
            .with_shutdown_grace(config.lifecycle.shutdown_grace());
        Self::with_endpoint(config, Box::new(endpoint))
    }

    /// Create a driver around an arbitrary endpoint implementation.
    pub fn with_endpoint(config: DriverConfig, endpoint: Box<dyn RendezvousEndpoint>) -> Self {
        let publisher = DiscoveryPublisher::from_config(&config.discovery);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
        Self {
            config,
            endpoint,
            publisher,
            phase: Phase::Init,
            port: None,
            plan: None,
            install_signal_handlers: true,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Leave process signal dispositions untouched.
    #[must_use]
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signal_handlers = false;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn plan(&self) -> Option<&AllocationPlan> {
        self.plan.as_ref()
    }

    pub fn publisher(&self) -> &DiscoveryPublisher {
        &self.publisher
    }

    /// Run the whole lifecycle and report how it ended.
    pub async fn run(mut self) -> DriverExit {
        let outcome = match self.startup().await {
            Ok(()) => Ok(self.serve().await),
            Err(e) => {
                error!(stage = %e.stage, error = %e.source, "Driver startup failed");
                Err(e)
            }
        };

        self.teardown().await;

        match outcome {
            Ok(reason) => {
                info!(?reason, "Driver exited");
                DriverExit::Graceful(reason)
            }
            Err(e) => DriverExit::StartupFailed(e),
        }
    }

    /// Parse, plan, start and initialize the endpoint, then publish.
    ///
    /// Leaves the driver in `Running` on success. On failure the caller is
    /// expected to call [`teardown`](Self::teardown).
    pub async fn startup(&mut self) -> Result<(), StartupError> {
        self.transition(Phase::Parsing);
        let worker_list = self.config.job.effective_worker_list();
        let (hosts, num_proc) = self
            .config
            .job
            .resolve()
            .map_err(|e| startup_error(StartupStage::ParseWorkerList, e))?;
        info!(worker_list = %worker_list, hosts = hosts.len(), num_proc, "Parsed worker list");

        self.transition(Phase::Planning);
        let plan = get_host_assignments(&hosts, num_proc)
            .map_err(|e| startup_error(StartupStage::PlanAllocation, e))?;
        for entry in &plan {
            debug!(
                hostname = %entry.hostname,
                rank = entry.rank,
                local_rank = entry.local_rank,
                cross_rank = entry.cross_rank,
                "Planned slot"
            );
        }

        self.transition(Phase::Serving);
        let port = self
            .endpoint
            .start()
            .await
            .map_err(|e| startup_error(StartupStage::StartEndpoint, e))?;
        self.port = Some(port);

        self.endpoint
            .init(plan.clone())
            .map_err(|e| startup_error(StartupStage::InitEndpoint, e))?;

        // Handlers go in before the artifact exists so a signal can never
        // leave it behind.
        if self.install_signal_handlers {
            signals::install(self.shutdown_handle());
        }

        let path = self
            .publisher
            .publish(port, &plan)
            .await
            .map_err(|e| startup_error(StartupStage::PublishArtifact, e))?;

        self.log_worker_envs(port, &plan);
        self.plan = Some(plan);
        self.transition(Phase::Running);

        info!(port, artifact = %path.display(), "Rendezvous service ready");
        Ok(())
    }

    /// Block until a shutdown request arrives or the serve window expires.
    pub async fn serve(&mut self) -> ShutdownReason {
        let serve_timeout = self.config.lifecycle.serve_timeout();
        info!(timeout_secs = serve_timeout.as_secs(), "Serving rendezvous requests");

        tokio::select! {
            Some(reason) = self.shutdown_rx.recv() => reason,
            _ = tokio::time::sleep(serve_timeout) => {
                info!("Serve window expired");
                ShutdownReason::ServeTimeout
            }
        }
    }

    /// Stop the endpoint and remove the discovery artifact.
    ///
    /// Safe to call any number of times and never fails.
    pub async fn teardown(&mut self) {
        if matches!(self.phase, Phase::ShuttingDown | Phase::Exited) {
            debug!("Teardown already performed");
            return;
        }
        self.transition(Phase::ShuttingDown);

        let grace = self.config.lifecycle.shutdown_grace();
        // The endpoint bounds its own drain; this is a backstop.
        let backstop = grace + Duration::from_millis(500);
        if tokio::time::timeout(backstop, self.endpoint.stop()).await.is_err() {
            warn!("Rendezvous endpoint did not stop in time");
        }

        if let Some(port) = self.port {
            self.publisher.cleanup(port);
        }

        self.transition(Phase::Exited);
    }

    fn transition(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, "Driver phase transition");
        self.phase = next;
    }

    fn log_worker_envs(&self, port: u16, plan: &AllocationPlan) {
        let address = &self.config.endpoint.advertise_address;
        for entry in plan {
            let env = WorkerEnv::for_entry(entry, address, port, &self.config.worker);
            debug!(rank = entry.rank, args = ?env.to_args(), env = ?env.vars(), "Worker environment");
        }
    }
}

fn startup_error(stage: StartupStage, source: RendezvousError) -> StartupError {
    StartupError { stage, source }
}
