//! In-memory virtualization platform

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use vmop_api::v1alpha1::virtualmachine::VirtualMachineStatus;
use vmop_api::{VirtualMachine, VirtualMachinePowerState, VirtualMachineSetResourcePolicy};

use crate::{ProviderError, Result, VirtualMachineProvider, VmConfigArgs};

/// Provider operations tracked by the simulator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Create,
    Update,
    Delete,
    ResourcePolicyReady,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ResourcePolicyReady => "resource-policy-ready",
        }
    }
}

/// A VM as the simulated platform sees it
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedVm {
    pub key: String,
    pub unique_id: String,
    pub bios_uuid: String,
    pub host: String,
    pub ip: String,
    pub power_state: VirtualMachinePowerState,
    pub class_name: String,
    pub image_name: String,
    pub storage_profile_id: String,
    pub content_library_uuid: String,
}

/// SimulatorProvider keeps VMs in memory and records every call made against it
pub struct SimulatorProvider {
    // Map of namespace/name to simulated VM
    vms: Arc<RwLock<HashMap<String, SimulatedVm>>>,
    calls: Arc<RwLock<HashMap<Operation, usize>>>,
    failures: Arc<RwLock<HashMap<Operation, String>>>,
    // zone/namespace/name of policies reported not ready
    unready_policies: Arc<RwLock<HashSet<String>>>,
    assign_ips: AtomicBool,
    next_id: AtomicU32,
}

impl SimulatorProvider {
    pub fn new() -> Self {
        Self {
            vms: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            unready_policies: Arc::new(RwLock::new(HashSet::new())),
            assign_ips: AtomicBool::new(true),
            next_id: AtomicU32::new(1),
        }
    }

    /// Make every subsequent call of `op` fail with `message`
    pub async fn fail(&self, op: Operation, message: impl Into<String>) {
        self.failures.write().await.insert(op, message.into());
    }

    pub async fn clear_failure(&self, op: Operation) {
        self.failures.write().await.remove(&op);
    }

    /// Report the named policy as not ready in `zone`
    pub async fn set_resource_policy_ready(&self, zone: &str, namespace: &str, name: &str, ready: bool) {
        let key = format!("{}/{}/{}", zone, namespace, name);
        let mut unready = self.unready_policies.write().await;
        if ready {
            unready.remove(&key);
        } else {
            unready.insert(key);
        }
    }

    /// Whether powered-on VMs get an IP address; off simulates a guest still booting
    pub fn set_assign_ips(&self, assign: bool) {
        self.assign_ips.store(assign, Ordering::SeqCst);
    }

    /// Number of calls made for `op`
    pub async fn calls(&self, op: Operation) -> usize {
        self.calls.read().await.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls across every operation
    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.values().sum()
    }

    pub async fn get(&self, key: &str) -> Option<SimulatedVm> {
        self.vms.read().await.get(key).cloned()
    }

    /// Insert a VM directly, as if it was created out of band
    pub async fn insert(&self, vm: SimulatedVm) {
        self.vms.write().await.insert(vm.key.clone(), vm);
    }

    pub async fn vm_count(&self) -> usize {
        self.vms.read().await.len()
    }

    async fn record(&self, op: Operation, target: &str) -> Result<()> {
        *self.calls.write().await.entry(op).or_insert(0) += 1;
        match self.failures.read().await.get(&op) {
            Some(message) => Err(ProviderError::operation(op.as_str(), target, message.clone())),
            None => Ok(()),
        }
    }

    fn allocate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for SimulatorProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(vm: &VirtualMachine) -> String {
    format!("{}/{}", vm.namespace().unwrap_or_default(), vm.name_any())
}

fn write_status(vm: &mut VirtualMachine, simulated: &SimulatedVm) {
    let status = vm.status.get_or_insert_with(VirtualMachineStatus::default);
    status.unique_id = simulated.unique_id.clone();
    status.bios_uuid = simulated.bios_uuid.clone();
    status.host = simulated.host.clone();
    status.vm_ip = simulated.ip.clone();
    status.power_state = Some(simulated.power_state);
}

#[async_trait]
impl VirtualMachineProvider for SimulatorProvider {
    async fn exists(&self, vm: &VirtualMachine) -> Result<bool> {
        let key = key_of(vm);
        self.record(Operation::Exists, &key).await?;
        Ok(self.vms.read().await.contains_key(&key))
    }

    async fn create(&self, vm: &mut VirtualMachine, args: &VmConfigArgs) -> Result<()> {
        let key = key_of(vm);
        self.record(Operation::Create, &key).await?;

        let id = self.allocate_id();
        let simulated = SimulatedVm {
            key: key.clone(),
            unique_id: format!("vm-{}", id),
            bios_uuid: uuid::Uuid::new_v4().to_string(),
            host: format!("esx-{}.sim.local", id % 4),
            ip: String::new(),
            power_state: VirtualMachinePowerState::PoweredOff,
            class_name: args.vm_class.name_any(),
            image_name: args.vm_image.name_any(),
            storage_profile_id: args.storage_profile_id.clone(),
            content_library_uuid: args.content_library_uuid.clone(),
        };
        write_status(vm, &simulated);
        self.vms.write().await.insert(key.clone(), simulated);

        info!(vm = %key, "Created simulated VM");
        Ok(())
    }

    async fn update(&self, vm: &mut VirtualMachine, args: &VmConfigArgs) -> Result<()> {
        let key = key_of(vm);
        self.record(Operation::Update, &key).await?;

        let mut vms = self.vms.write().await;
        let simulated = vms
            .get_mut(&key)
            .ok_or_else(|| ProviderError::NotFound(key.clone()))?;

        simulated.power_state = vm.spec.power_state;
        simulated.class_name = args.vm_class.name_any();
        simulated.storage_profile_id = args.storage_profile_id.clone();
        match simulated.power_state {
            VirtualMachinePowerState::PoweredOn => {
                if simulated.ip.is_empty() && self.assign_ips.load(Ordering::SeqCst) {
                    let id = simulated.unique_id.trim_start_matches("vm-").parse::<u32>().unwrap_or(0);
                    simulated.ip = format!("10.244.{}.{}", id / 250, id % 250 + 2);
                }
            }
            VirtualMachinePowerState::PoweredOff => simulated.ip.clear(),
        }
        write_status(vm, simulated);

        debug!(vm = %key, power_state = ?simulated.power_state, "Updated simulated VM");
        Ok(())
    }

    async fn delete(&self, vm: &VirtualMachine) -> Result<()> {
        let key = key_of(vm);
        self.record(Operation::Delete, &key).await?;

        match self.vms.write().await.remove(&key) {
            Some(_) => {
                info!(vm = %key, "Deleted simulated VM");
                Ok(())
            }
            None => Err(ProviderError::NotFound(key)),
        }
    }

    async fn is_resource_policy_ready(
        &self,
        zone: &str,
        policy: &VirtualMachineSetResourcePolicy,
    ) -> Result<bool> {
        let key = format!("{}/{}/{}", zone, policy.namespace().unwrap_or_default(), policy.name_any());
        self.record(Operation::ResourcePolicyReady, &key).await?;
        Ok(!self.unready_policies.read().await.contains(&key))
    }
}
