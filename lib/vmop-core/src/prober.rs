//! Liveness-probe manager for reconciled VirtualMachines

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vmop_api::VirtualMachine;

use crate::probe::{ProbeResult, ReadinessProber, TcpProber};

/// Registration of VMs for periodic readiness checks
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ProberManager: Send + Sync {
    async fn add(&self, vm: &VirtualMachine);
    async fn remove(&self, vm: &VirtualMachine);
}

#[derive(Clone, Debug)]
struct ProbeEntry {
    vm: VirtualMachine,
    last: Option<ProbeResult>,
}

/// ProbeRegistry tracks registered VMs and the last result of probing each one
pub struct ProbeRegistry {
    // Map of namespace/name to the latest registered VM
    entries: Arc<RwLock<HashMap<String, ProbeEntry>>>,
    prober: Arc<dyn ReadinessProber>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::with_prober(Arc::new(TcpProber))
    }

    pub fn with_prober(prober: Arc<dyn ReadinessProber>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            prober,
        }
    }

    /// Last probe outcome for `key`: `None` when unregistered, unprobed or without a probe
    pub async fn is_ready(&self, key: &str) -> Option<bool> {
        let entries = self.entries.read().await;
        match entries.get(key)?.last.as_ref()? {
            ProbeResult::Success => Some(true),
            ProbeResult::Failure(_) => Some(false),
            ProbeResult::Unknown => None,
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Probe every registered VM that has a readiness probe and an IP
    pub async fn probe_all(&self) {
        let candidates: Vec<(String, VirtualMachine)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| e.vm.spec.readiness_probe.is_some() && !e.vm.vm_ip().is_empty())
                .map(|(k, e)| (k.clone(), e.vm.clone()))
                .collect()
        };

        for (key, vm) in candidates {
            let result = self.prober.probe(&vm).await;
            let mut entries = self.entries.write().await;
            // Removed while probing
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };
            if entry.last.as_ref() != Some(&result) {
                match &result {
                    ProbeResult::Success => info!(vm = %key, "VM readiness probe succeeded"),
                    ProbeResult::Failure(reason) => warn!(vm = %key, reason = %reason, "VM readiness probe failed"),
                    ProbeResult::Unknown => debug!(vm = %key, "VM has no readiness probe"),
                }
            }
            entry.last = Some(result);
        }
    }

    /// Probe registered VMs every `period` until the task is dropped
    pub async fn run(self: Arc<Self>, period: Duration) {
        info!(period = ?period, "Starting VM readiness prober");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.probe_all().await;
        }
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProberManager for ProbeRegistry {
    async fn add(&self, vm: &VirtualMachine) {
        let key = vm.namespaced_name();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&key) {
            Some(entry) => entry.vm = vm.clone(),
            None => {
                entries.insert(key.clone(), ProbeEntry { vm: vm.clone(), last: None });
                debug!(vm = %key, "Registered VM with prober");
            }
        }
    }

    async fn remove(&self, vm: &VirtualMachine) {
        let key = vm.namespaced_name();
        if self.entries.write().await.remove(&key).is_some() {
            debug!(vm = %key, "Deregistered VM from prober");
        }
    }
}
