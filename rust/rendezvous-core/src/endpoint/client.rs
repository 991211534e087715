//! Rendezvous client used by workers.
//!
//! Workers identify themselves by hostname and local rank and receive their
//! [`AllocationEntry`], or the full worker environment, from the driver.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::protocol::{endpoints, ErrorResponse, HealthResponse};
use crate::env::WorkerEnv;
use crate::error::{Result, RendezvousError};
use crate::plan::{AllocationEntry, AllocationPlan};

/// HTTP client for the rendezvous endpoint.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    client: reqwest::Client,
    base_url: String,
}

impl RendezvousClient {
    /// Create a client for the endpoint at `address:port`.
    ///
    /// `timeout` bounds every request; it should exceed the server's
    /// plan wait so early workers get a diagnostic rather than a timeout.
    pub fn new(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RendezvousError::client_with_source("failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", address, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json(endpoints::HEALTH.to_string()).await
    }

    /// Poll the health endpoint until the service answers.
    pub async fn wait_until_ready(
        &self,
        max_attempts: u32,
        initial_delay: Duration,
    ) -> Result<HealthResponse> {
        let mut attempts = 0;
        let mut delay = initial_delay;

        loop {
            match self.health().await {
                Ok(health) => return Ok(health),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(RendezvousError::client(format!(
                            "rendezvous service at {} not ready after {} attempts: {}",
                            self.base_url, attempts, e
                        )));
                    }

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(5));
                }
            }
        }
    }

    /// Fetch the entry for the slot identified by `hostname` and `local_rank`.
    pub async fn assignment(&self, hostname: &str, local_rank: usize) -> Result<AllocationEntry> {
        self.get_json(format!("{}/{}/{}", endpoints::ASSIGNMENT, hostname, local_rank))
            .await
    }

    /// Fetch the entry for a global rank.
    pub async fn rank(&self, rank: usize) -> Result<AllocationEntry> {
        self.get_json(format!("{}/{}", endpoints::RANK, rank)).await
    }

    pub async fn plan(&self) -> Result<AllocationPlan> {
        self.get_json(endpoints::PLAN.to_string()).await
    }

    /// Fetch the environment a worker should run with.
    pub async fn worker_env(&self, hostname: &str, local_rank: usize) -> Result<WorkerEnv> {
        self.get_json(format!("{}/{}/{}", endpoints::ENV, hostname, local_rank))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: String) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).send().await.map_err(|e| {
            RendezvousError::client_with_source(format!("request to {} failed", url), e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => match body.details {
                    Some(details) => format!("HTTP {}: {} ({})", status, body.error, details),
                    None => format!("HTTP {}: {}", status, body.error),
                },
                Err(_) => format!("HTTP {}: request to {} failed", status, url),
            };
            return Err(RendezvousError::client(message));
        }

        response.json().await.map_err(|e| {
            RendezvousError::client_with_source(format!("invalid response from {}", url), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let client = RendezvousClient::new("driver", 29400, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://driver:29400");
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RendezvousClient::new("127.0.0.1", port, Duration::from_secs(1)).unwrap();

        let err = client
            .wait_until_ready(2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not ready after 2 attempts"));
    }
}
