//! Rendezvous driver for distributed training jobs.
//!
//! The driver turns a worker list into a rank allocation plan, serves that
//! plan to workers over a rendezvous endpoint, publishes a discovery
//! artifact next to it, and tears everything down when the job window ends
//! or a signal arrives.
//!
//! # Usage
//!
//! ```bash
//! # Single local process
//! rdzv-driver
//!
//! # Four local processes
//! rdzv-driver -a 4
//!
//! # Two hosts, three processes
//! rdzv-driver -w hostA:2,hostB:1
//! ```

mod lifecycle;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lifecycle::Driver;
use rdzv_core::{DriverConfig, Result};

/// Rendezvous driver
#[derive(Parser, Debug)]
#[command(name = "rdzv-driver")]
#[command(about = "Rendezvous coordinator for distributed training jobs")]
struct Args {
    /// Total number of training processes
    #[arg(short = 'a', long = "num_proc")]
    num_proc: Option<usize>,

    /// Comma-separated host:slots list (default: localhost:<num_proc>)
    #[arg(short = 'w', long = "worker_list")]
    worker_list: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the rendezvous endpoint (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address the rendezvous endpoint binds to
    #[arg(long)]
    address: Option<String>,

    /// Address workers use to reach the rendezvous endpoint
    #[arg(long)]
    advertise_address: Option<String>,

    /// Directory for the discovery artifact
    #[arg(long)]
    discovery_dir: Option<PathBuf>,

    /// Seconds to keep the rendezvous service alive
    #[arg(long)]
    serve_timeout: Option<u64>,

    /// Allow workers to join after the plan is published
    #[arg(long)]
    elastic: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Layer file config, environment overrides and CLI flags, in that order.
    fn resolve_config(&self) -> Result<DriverConfig> {
        let config = match &self.config {
            Some(path) => DriverConfig::from_file(path)?,
            None => DriverConfig::default(),
        };
        let mut config = config.with_env_overrides();

        if let Some(num_proc) = self.num_proc {
            config.job.num_proc = Some(num_proc);
        }
        if let Some(worker_list) = &self.worker_list {
            config.job.worker_list = Some(worker_list.clone());
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        if let Some(address) = &self.address {
            config.endpoint.bind_address = address.clone();
        }
        if let Some(address) = &self.advertise_address {
            config.endpoint.advertise_address = address.clone();
        }
        if let Some(dir) = &self.discovery_dir {
            config.discovery.dir = dir.clone();
        }
        if let Some(secs) = self.serve_timeout {
            config.lifecycle.serve_timeout_secs = secs;
        }
        if self.elastic {
            config.worker.elastic = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting rendezvous driver");
    tracing::info!("  Worker list: {}", config.job.effective_worker_list());
    tracing::info!("  Discovery dir: {}", config.discovery.dir.display());
    tracing::info!("  Serve timeout: {}s", config.lifecycle.serve_timeout_secs);
    tracing::info!("  Elastic: {}", config.worker.elastic);

    let exit = Driver::new(config).run().await;
    if let lifecycle::DriverExit::StartupFailed(e) = &exit {
        eprintln!("rdzv-driver: {}", e);
    }
    ExitCode::from(exit.code())
}
