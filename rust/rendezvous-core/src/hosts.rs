// rust/rendezvous-core/src/hosts.rs

//! Worker list parsing.
//!
//! A worker list is a comma-separated sequence of `hostname[:slots]` tokens,
//! for example `hostA:2,hostB:1`. Each token becomes a [`HostSpec`]; order
//! is preserved because rank assignment walks hosts in input order.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RendezvousError};

/// Hostname used when no worker list is supplied.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Upper bound on the slots a single host may contribute.
pub const MAX_SLOTS_PER_HOST: usize = 65_536;

/// Hostnames are DNS names or IPv4 literals, which keeps them usable as a
/// single URL path segment.
fn validate_hostname(token: &str, hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(RendezvousError::parse(token, "hostname must not be empty"));
    }
    if let Some(c) = hostname
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(RendezvousError::parse(
            token,
            format!("hostname '{}' contains invalid character '{}'", hostname, c),
        ));
    }
    Ok(())
}

fn validate_slots(token: &str, slots: u64) -> Result<usize> {
    if slots == 0 {
        return Err(RendezvousError::parse(token, "slots must be greater than 0"));
    }
    if slots > MAX_SLOTS_PER_HOST as u64 {
        return Err(RendezvousError::parse(
            token,
            format!("slots must be at most {}, got {}", MAX_SLOTS_PER_HOST, slots),
        ));
    }
    Ok(slots as usize)
}

/// A host and the number of process slots it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostSpec {
    pub hostname: String,
    pub slots: usize,
}

impl HostSpec {
    /// Create a host spec, rejecting invalid hostnames and out-of-range slots.
    pub fn new(hostname: impl Into<String>, slots: usize) -> Result<Self> {
        let hostname = hostname.into();
        let token = format!("{}:{}", hostname, slots);
        validate_hostname(&token, &hostname)?;
        let slots = validate_slots(&token, slots as u64)?;
        Ok(Self { hostname, slots })
    }
}

impl FromStr for HostSpec {
    type Err = RendezvousError;

    /// Parse a single `hostname[:slots]` token.
    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim();
        let (hostname, slots) = match token.split_once(':') {
            Some((hostname, slots)) => {
                let slots = slots.trim();
                let value: i64 = slots.parse().map_err(|_| {
                    RendezvousError::parse(token, format!("slots '{}' is not an integer", slots))
                })?;
                if value <= 0 {
                    return Err(RendezvousError::parse(
                        token,
                        format!("slots must be greater than 0, got {}", value),
                    ));
                }
                (hostname.trim(), validate_slots(token, value as u64)?)
            }
            None => (token, 1),
        };

        validate_hostname(token, hostname)?;

        Ok(Self {
            hostname: hostname.to_string(),
            slots,
        })
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.slots)
    }
}

/// Parse a comma-separated worker list into host specs, in input order.
///
/// # Errors
///
/// Returns [`RendezvousError::Parse`] for an empty list, an empty hostname,
/// a hostname with characters outside `[A-Za-z0-9._-]`, non-integer slots,
/// slots outside `1..=MAX_SLOTS_PER_HOST`, or a hostname listed twice.
pub fn parse_hosts(worker_list: &str) -> Result<Vec<HostSpec>> {
    if worker_list.trim().is_empty() {
        return Err(RendezvousError::parse(worker_list, "worker list is empty"));
    }

    let hosts: Vec<HostSpec> = worker_list
        .split(',')
        .map(str::parse)
        .collect::<Result<_>>()?;

    let mut seen = HashSet::with_capacity(hosts.len());
    for host in &hosts {
        if !seen.insert(host.hostname.as_str()) {
            return Err(RendezvousError::parse(
                worker_list,
                format!("hostname '{}' is listed more than once", host.hostname),
            ));
        }
    }

    Ok(hosts)
}

/// Render host specs back into worker-list form.
pub fn format_hosts(hosts: &[HostSpec]) -> String {
    hosts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Total number of slots across all hosts, saturating at `usize::MAX`.
pub fn total_slots(hosts: &[HostSpec]) -> usize {
    hosts
        .iter()
        .fold(0usize, |total, h| total.saturating_add(h.slots))
}

/// Default worker list for a single-host job running `num_proc` processes.
pub fn default_worker_list(num_proc: usize) -> String {
    format!("{}:{}", DEFAULT_HOSTNAME, num_proc)
}
