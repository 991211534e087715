// rust/rendezvous-core/src/config.rs

//! Configuration management for the rendezvous driver.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, RendezvousError};
use crate::hosts::{default_worker_list, parse_hosts, total_slots, HostSpec};

// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub job: JobConfig,
    pub endpoint: EndpointConfig,
    pub discovery: DiscoveryConfig,
    pub lifecycle: LifecycleConfig,
    pub worker: WorkerSettings,
}

/// Which hosts take part in the job and how many processes to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Comma-separated `host:slots` list. Defaults to `localhost:<num_proc>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_list: Option<String>,
    /// Total process count. Defaults to 1 without a worker list, otherwise
    /// to the total number of slots in the list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_proc: Option<usize>,
}

impl JobConfig {
    /// The worker list after applying the `localhost:<num_proc>` default.
    pub fn effective_worker_list(&self) -> String {
        match &self.worker_list {
            Some(list) => list.clone(),
            None => default_worker_list(self.num_proc.unwrap_or(1)),
        }
    }

    /// Parse the worker list and settle the process count.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the worker list is malformed.
    pub fn resolve(&self) -> Result<(Vec<HostSpec>, usize)> {
        let hosts = parse_hosts(&self.effective_worker_list())?;
        let num_proc = self.num_proc.unwrap_or_else(|| total_slots(&hosts));
        Ok((hosts, num_proc))
    }
}

// Rendezvous listener options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    // Address the listener binds to.
    pub bind_address: String,
    // Address workers are told to reach the rendezvous service on.
    pub advertise_address: String,
    // Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    // How long a worker request waits for the plan before failing.
    pub init_wait_ms: u64,
}

/// Where the discovery artifact is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory holding `<port><suffix>` artifacts.
    pub dir: PathBuf,
    /// Fixed suffix appended to the port number.
    pub suffix: String,
}

// Driver lifetime options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    // Upper bound on how long the driver keeps the service alive.
    pub serve_timeout_secs: u64,
    // Upper bound on teardown once shutdown starts.
    pub shutdown_grace_ms: u64,
}

/// Settings handed to every worker through its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Controller backend for the collective library.
    pub controller: String,
    /// Backend used for CPU collective operations.
    pub cpu_operations: String,
    /// Collective-op timeout in seconds.
    pub timeout_secs: u64,
    /// Whether workers may join after the plan is published.
    pub elastic: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            advertise_address: "localhost".to_string(),
            port: 0,
            init_wait_ms: 30_000,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("rdzv"),
            suffix: "_rendezvous.json".to_string(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            serve_timeout_secs: 1000,
            shutdown_grace_ms: 2000,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            controller: "gloo".to_string(),
            cpu_operations: "gloo".to_string(),
            timeout_secs: 2000,
            elastic: false,
        }
    }
}

impl EndpointConfig {
    pub fn init_wait(&self) -> Duration {
        Duration::from_millis(self.init_wait_ms)
    }
}

impl LifecycleConfig {
    pub fn serve_timeout(&self) -> Duration {
        Duration::from_secs(self.serve_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl FromStr for DriverConfig {
    type Err = RendezvousError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| RendezvousError::config_with_source("failed to parse TOML config", e))
    }
}

impl DriverConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RendezvousError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `RDZV_` followed by the section and field:
    // - `RDZV_JOB_WORKER_LIST` overrides `job.worker_list`
    // - `RDZV_ENDPOINT_PORT` overrides `endpoint.port`
    // - `RDZV_DISCOVERY_DIR` overrides `discovery.dir`
    // - `RDZV_WORKER_ELASTIC` overrides `worker.elastic`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Job overrides
        if let Ok(val) = std::env::var("RDZV_JOB_WORKER_LIST") {
            self.job.worker_list = Some(val);
        }
        if let Ok(val) = std::env::var("RDZV_JOB_NUM_PROC") {
            if let Ok(v) = val.parse() {
                self.job.num_proc = Some(v);
            }
        }

        // Endpoint overrides
        if let Ok(val) = std::env::var("RDZV_ENDPOINT_BIND_ADDRESS") {
            self.endpoint.bind_address = val;
        }
        if let Ok(val) = std::env::var("RDZV_ENDPOINT_ADVERTISE_ADDRESS") {
            self.endpoint.advertise_address = val;
        }
        if let Ok(val) = std::env::var("RDZV_ENDPOINT_PORT") {
            if let Ok(v) = val.parse() {
                self.endpoint.port = v;
            }
        }
        if let Ok(val) = std::env::var("RDZV_ENDPOINT_INIT_WAIT_MS") {
            if let Ok(v) = val.parse() {
                self.endpoint.init_wait_ms = v;
            }
        }

        // Discovery overrides
        if let Ok(val) = std::env::var("RDZV_DISCOVERY_DIR") {
            self.discovery.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("RDZV_DISCOVERY_SUFFIX") {
            self.discovery.suffix = val;
        }

        // Lifecycle overrides
        if let Ok(val) = std::env::var("RDZV_LIFECYCLE_SERVE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.lifecycle.serve_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RDZV_LIFECYCLE_SHUTDOWN_GRACE_MS") {
            if let Ok(v) = val.parse() {
                self.lifecycle.shutdown_grace_ms = v;
            }
        }

        // Worker overrides
        if let Ok(val) = std::env::var("RDZV_WORKER_CONTROLLER") {
            self.worker.controller = val;
        }
        if let Ok(val) = std::env::var("RDZV_WORKER_CPU_OPERATIONS") {
            self.worker.cpu_operations = val;
        }
        if let Ok(val) = std::env::var("RDZV_WORKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.worker.timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RDZV_WORKER_ELASTIC") {
            if let Ok(v) = val.parse() {
                self.worker.elastic = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // The worker list itself is checked when the driver parses it, so a
    // malformed list surfaces as a parse failure rather than a config one.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.bind_address.is_empty() {
            return Err(RendezvousError::config(
                "endpoint.bind_address must not be empty",
            ));
        }
        if self.endpoint.advertise_address.is_empty() {
            return Err(RendezvousError::config(
                "endpoint.advertise_address must not be empty",
            ));
        }
        if self.endpoint.init_wait_ms == 0 {
            return Err(RendezvousError::config(
                "endpoint.init_wait_ms must be greater than 0",
            ));
        }

        if self.discovery.dir.as_os_str().is_empty() {
            return Err(RendezvousError::config("discovery.dir must not be empty"));
        }
        if self.discovery.suffix.is_empty() || self.discovery.suffix.contains('/') {
            return Err(RendezvousError::config(
                "discovery.suffix must be a non-empty file name suffix",
            ));
        }

        if self.lifecycle.serve_timeout_secs == 0 {
            return Err(RendezvousError::config(
                "lifecycle.serve_timeout_secs must be greater than 0",
            ));
        }

        if self.worker.controller.is_empty() {
            return Err(RendezvousError::config("worker.controller must not be empty"));
        }
        if self.worker.timeout_secs == 0 {
            return Err(RendezvousError::config(
                "worker.timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}
