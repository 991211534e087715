//! Wire types shared by the rendezvous server and its workers.
//!
//! The endpoint speaks JSON over HTTP. Successful lookups return an
//! [`AllocationEntry`](crate::plan::AllocationEntry), the whole plan, or a
//! worker environment; failures return an [`ErrorResponse`].

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status, always "ok" while the listener is up.
    pub status: String,
    /// Whether the allocation plan has been installed.
    pub initialized: bool,
}

/// Error body returned by the rendezvous server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// HTTP endpoint paths.
pub mod endpoints {
    /// GET /health
    pub const HEALTH: &str = "/health";

    /// GET /rendezvous/assignment/{hostname}/{local_rank}
    pub const ASSIGNMENT: &str = "/rendezvous/assignment";

    /// GET /rendezvous/rank/{rank}
    pub const RANK: &str = "/rendezvous/rank";

    /// GET /rendezvous/plan
    pub const PLAN: &str = "/rendezvous/plan";

    /// GET /rendezvous/env/{hostname}/{local_rank}
    pub const ENV: &str = "/rendezvous/env";
}
