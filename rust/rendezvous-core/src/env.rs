// rust/rendezvous-core/src/env.rs

//! Environment handed to worker processes.
//!
//! The training library running inside each worker reads its rendezvous
//! address and rank layout from `HOROVOD_*` variables. This module renders
//! those variables (and the equivalent worker script arguments) for one
//! allocation entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::WorkerSettings;
use crate::plan::AllocationEntry;

pub const RENDEZVOUS_ADDR: &str = "HOROVOD_GLOO_RENDEZVOUS_ADDR";
pub const RENDEZVOUS_PORT: &str = "HOROVOD_GLOO_RENDEZVOUS_PORT";
pub const CONTROLLER: &str = "HOROVOD_CONTROLLER";
pub const CPU_OPERATIONS: &str = "HOROVOD_CPU_OPERATIONS";
pub const HOSTNAME: &str = "HOROVOD_HOSTNAME";
pub const RANK: &str = "HOROVOD_RANK";
pub const SIZE: &str = "HOROVOD_SIZE";
pub const LOCAL_RANK: &str = "HOROVOD_LOCAL_RANK";
pub const LOCAL_SIZE: &str = "HOROVOD_LOCAL_SIZE";
pub const CROSS_RANK: &str = "HOROVOD_CROSS_RANK";
pub const CROSS_SIZE: &str = "HOROVOD_CROSS_SIZE";
pub const TIMEOUT_SECONDS: &str = "HOROVOD_GLOO_TIMEOUT_SECONDS";
pub const ELASTIC: &str = "HOROVOD_ELASTIC";

/// Environment variables for a single worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerEnv {
    vars: BTreeMap<String, String>,
}

impl WorkerEnv {
    /// Build the environment for the worker running `entry`.
    pub fn for_entry(
        entry: &AllocationEntry,
        rendezvous_addr: &str,
        rendezvous_port: u16,
        settings: &WorkerSettings,
    ) -> Self {
        let mut vars = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            vars.insert(key.to_string(), value);
        };

        set(RENDEZVOUS_ADDR, rendezvous_addr.to_string());
        set(RENDEZVOUS_PORT, rendezvous_port.to_string());
        set(CONTROLLER, settings.controller.clone());
        set(CPU_OPERATIONS, settings.cpu_operations.clone());
        set(HOSTNAME, entry.hostname.clone());
        set(RANK, entry.rank.to_string());
        set(SIZE, entry.size.to_string());
        set(LOCAL_RANK, entry.local_rank.to_string());
        set(LOCAL_SIZE, entry.local_size.to_string());
        set(CROSS_RANK, entry.cross_rank.to_string());
        set(CROSS_SIZE, entry.cross_size.to_string());
        set(TIMEOUT_SECONDS, settings.timeout_secs.to_string());
        if settings.elastic {
            set(ELASTIC, "1".to_string());
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Arguments understood by the worker training script, equivalent to
    /// this environment.
    pub fn to_args(&self) -> Vec<String> {
        let flags = [
            ("-p", RENDEZVOUS_PORT),
            ("-r", RANK),
            ("-s", SIZE),
            ("-a", LOCAL_RANK),
            ("-b", LOCAL_SIZE),
            ("-c", CROSS_RANK),
            ("-d", CROSS_SIZE),
            ("-e", TIMEOUT_SECONDS),
        ];

        let mut args = Vec::with_capacity(flags.len() * 2 + 1);
        for (flag, key) in flags {
            if let Some(value) = self.get(key) {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        }
        if self.vars.contains_key(ELASTIC) {
            args.push("-t".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::parse_hosts;
    use crate::plan::get_host_assignments;

    fn sample_entry() -> AllocationEntry {
        let hosts = parse_hosts("hostA:2,hostB:1").unwrap();
        get_host_assignments(&hosts, 3).unwrap().entries()[2].clone()
    }

    #[test]
    fn test_env_for_entry() {
        let env = WorkerEnv::for_entry(&sample_entry(), "driver", 41000, &WorkerSettings::default());

        assert_eq!(env.get(RENDEZVOUS_ADDR), Some("driver"));
        assert_eq!(env.get(RENDEZVOUS_PORT), Some("41000"));
        assert_eq!(env.get(CONTROLLER), Some("gloo"));
        assert_eq!(env.get(CPU_OPERATIONS), Some("gloo"));
        assert_eq!(env.get(HOSTNAME), Some("hostB"));
        assert_eq!(env.get(RANK), Some("2"));
        assert_eq!(env.get(SIZE), Some("3"));
        assert_eq!(env.get(LOCAL_RANK), Some("0"));
        assert_eq!(env.get(LOCAL_SIZE), Some("1"));
        assert_eq!(env.get(CROSS_RANK), Some("1"));
        assert_eq!(env.get(CROSS_SIZE), Some("2"));
        assert_eq!(env.get(TIMEOUT_SECONDS), Some("2000"));
        assert_eq!(env.get(ELASTIC), None);
    }

    #[test]
    fn test_elastic_flag() {
        let settings = WorkerSettings {
            elastic: true,
            ..Default::default()
        };
        let env = WorkerEnv::for_entry(&sample_entry(), "localhost", 1, &settings);

        assert_eq!(env.get(ELASTIC), Some("1"));
        assert_eq!(env.to_args().last().map(String::as_str), Some("-t"));
    }

    #[test]
    fn test_to_args() {
        let env = WorkerEnv::for_entry(&sample_entry(), "localhost", 41000, &WorkerSettings::default());

        assert_eq!(
            env.to_args(),
            vec![
                "-p", "41000", "-r", "2", "-s", "3", "-a", "0", "-b", "1", "-c", "1", "-d", "2",
                "-e", "2000",
            ]
        );
    }
}
