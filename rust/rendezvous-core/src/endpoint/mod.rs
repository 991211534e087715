//! Rendezvous endpoint.
//!
//! The endpoint lets workers discover their place in the job:
//!
//! - [`RendezvousEndpoint`] is the capability the driver depends on
//! - [`HttpRendezvousServer`] serves the plan over HTTP/JSON
//! - [`RendezvousClient`] is what workers use to fetch their assignment

mod client;
pub mod protocol;
mod server;

use async_trait::async_trait;

use crate::error::Result;
use crate::plan::AllocationPlan;

pub use client::RendezvousClient;
pub use protocol::{ErrorResponse, HealthResponse};
pub use server::HttpRendezvousServer;

/// Lifecycle contract of a rendezvous endpoint.
///
/// `start` binds the listener and may run before the plan exists; `init`
/// installs the plan exactly once. Workers are never served a partial plan.
#[async_trait]
pub trait RendezvousEndpoint: Send + Sync {
    /// Bind and begin listening, returning the bound port.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyStarted` on a second call and `EndpointStart` if
    /// the listener cannot be bound.
    async fn start(&mut self) -> Result<u16>;

    /// Install the allocation plan.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyInitialized` if a plan is already installed and
    /// `NotStarted` before `start`.
    fn init(&self, plan: AllocationPlan) -> Result<()>;

    /// Bound port, once started.
    fn port(&self) -> Option<u16>;

    /// Stop serving. Best-effort and idempotent; never fails.
    async fn stop(&mut self);
}
