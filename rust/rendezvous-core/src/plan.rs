// rust/rendezvous-core/src/plan.rs

//! Rank allocation for a distributed training job.
//!
//! Given an ordered list of hosts and a process count, the planner assigns
//! every process a global rank, a local rank within its host and a cross
//! rank among the processes that share its local rank on other hosts.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RendezvousError};
use crate::hosts::{total_slots, HostSpec};

/// Assignment for a single process slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationEntry {
    /// Host this process runs on.
    pub hostname: String,
    /// Globally unique rank (0-based).
    pub rank: usize,
    /// Rank among the processes on the same host.
    pub local_rank: usize,
    /// Rank among the processes sharing `local_rank` across hosts.
    pub cross_rank: usize,
    /// Total number of processes in the job.
    pub size: usize,
    /// Number of processes on this host.
    pub local_size: usize,
    /// Number of hosts with a process at this `local_rank`.
    pub cross_size: usize,
}

/// The full set of assignments for one job, ordered by rank.
///
/// Serialized as a plain JSON array of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationPlan {
    entries: Vec<AllocationEntry>,
}

impl AllocationPlan {
    /// Entries in rank order.
    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AllocationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a global rank.
    pub fn by_rank(&self, rank: usize) -> Option<&AllocationEntry> {
        // entries are stored in rank order
        self.entries.get(rank)
    }

    /// Entry for the slot a worker identifies by hostname and local rank.
    pub fn find(&self, hostname: &str, local_rank: usize) -> Option<&AllocationEntry> {
        self.entries
            .iter()
            .find(|e| e.hostname == hostname && e.local_rank == local_rank)
    }

    /// Distinct hostnames in allocation order.
    pub fn hostnames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.hostname.as_str()) {
                names.push(entry.hostname.as_str());
            }
        }
        names
    }
}

impl<'a> IntoIterator for &'a AllocationPlan {
    type Item = &'a AllocationEntry;
    type IntoIter = std::slice::Iter<'a, AllocationEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Assign ranks for `num_proc` processes over `hosts`.
///
/// Slots are consumed in host order and, within a host, in slot order, so
/// only the first `num_proc` slots are used. `local_size` and `cross_size`
/// count processes that were actually allocated.
///
/// # Errors
///
/// Returns [`RendezvousError::InsufficientSlots`] if `num_proc` exceeds the
/// total number of slots.
pub fn get_host_assignments(hosts: &[HostSpec], num_proc: usize) -> Result<AllocationPlan> {
    let available = total_slots(hosts);
    if num_proc > available {
        return Err(RendezvousError::insufficient_slots(num_proc, available));
    }

    // Processes placed on each host, skipping hosts that receive none
    let mut remaining = num_proc;
    let placed: Vec<(&HostSpec, usize)> = hosts
        .iter()
        .map(|host| {
            let count = host.slots.min(remaining);
            remaining -= count;
            (host, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    let widest = placed.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let mut cross_sizes = vec![0usize; widest];
    for (_, count) in &placed {
        for size in cross_sizes.iter_mut().take(*count) {
            *size += 1;
        }
    }

    let mut next_cross_rank = vec![0usize; widest];
    let mut entries = Vec::with_capacity(num_proc);

    for (host, count) in placed {
        for local_rank in 0..count {
            entries.push(AllocationEntry {
                hostname: host.hostname.clone(),
                rank: entries.len(),
                local_rank,
                cross_rank: next_cross_rank[local_rank],
                size: num_proc,
                local_size: count,
                cross_size: cross_sizes[local_rank],
            });
            next_cross_rank[local_rank] += 1;
        }
    }

    Ok(AllocationPlan { entries })
}
