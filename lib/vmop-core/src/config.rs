//! Manager configuration and controller identities

use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 1;
pub const DEFAULT_MAX_CREATE_VMS_ON_PROVIDER: u32 = 80;
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(600);
pub const DEFAULT_PROBE_PERIOD: Duration = Duration::from_secs(10);

/// Feature switches read from the environment at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureGates {
    /// Enforce VirtualMachineClassBinding and ContentSourceBinding visibility
    pub vm_service: bool,
    /// Generate instance storage volumes and gate creation on their placement
    pub instance_storage: bool,
}

/// Static naming of a controller, used for logging, metrics and the event reporter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerIdentity {
    /// Kind of the reconciled resource
    pub kind: &'static str,
    pub short_name: &'static str,
}

impl ControllerIdentity {
    pub const fn new(kind: &'static str, short_name: &'static str) -> Self {
        Self { kind, short_name }
    }

    /// `<pod-namespace>/<manager-name>/<short-name>`
    pub fn reporter_name(&self, config: &ManagerConfig) -> String {
        format!("{}/{}/{}", config.pod_namespace, config.manager_name, self.short_name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManagerConfig {
    pub max_concurrent_reconciles: usize,
    /// Share of `max_concurrent_reconciles`, in percent, allowed to create VMs at once
    pub max_create_vms_on_provider: u32,
    pub sync_period: Duration,
    pub features: FeatureGates,
    /// Restrict watches to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    pub pod_namespace: String,
    pub manager_name: String,
    pub probe_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            max_create_vms_on_provider: DEFAULT_MAX_CREATE_VMS_ON_PROVIDER,
            sync_period: DEFAULT_SYNC_PERIOD,
            features: FeatureGates::default(),
            watch_namespace: None,
            pod_namespace: "vmware-system-vmop".to_string(),
            manager_name: "vmoperator-controller-manager".to_string(),
            probe_period: DEFAULT_PROBE_PERIOD,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_reconciles == 0 {
            return Err(Error::Config("max concurrent reconciles must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.max_create_vms_on_provider) {
            return Err(Error::Config(format!(
                "max create VMs on provider must be a percentage in 1..=100, got {}",
                self.max_create_vms_on_provider
            )));
        }
        if self.sync_period.is_zero() {
            return Err(Error::Config("sync period must be positive".to_string()));
        }
        if self.probe_period.is_zero() {
            return Err(Error::Config("probe period must be positive".to_string()));
        }
        Ok(())
    }
}
