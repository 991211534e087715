// rust/rendezvous-core/src/lib.rs

//! Rendezvous - Core Library
//!
//! This crate provides the pieces a driver needs to bring up a distributed
//! training job: worker list parsing, rank allocation, the rendezvous
//! endpoint workers query for their assignment, and the discovery artifact
//! that lets external tooling find the endpoint.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::{DriverConfig, WorkerSettings};
pub use error::{RendezvousError, Result};

pub mod hosts;
pub use hosts::{format_hosts, parse_hosts, HostSpec};

pub mod plan;
pub use plan::{get_host_assignments, AllocationEntry, AllocationPlan};

pub mod endpoint;
pub use endpoint::{HttpRendezvousServer, RendezvousClient, RendezvousEndpoint};

pub mod discovery;
pub use discovery::DiscoveryPublisher;

pub mod env;
pub use env::WorkerEnv;
