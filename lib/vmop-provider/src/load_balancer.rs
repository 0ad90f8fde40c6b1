use async_trait::async_trait;
use vmop_api::{VirtualMachine, VirtualMachineService};

use crate::Result;

/// Provisions infrastructure load balancers for LoadBalancer type VirtualMachineServices
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait LoadBalancerProvider: Send + Sync {
    /// Network the load balancer should attach to, derived from the selected VMs
    fn network_name(&self, vms: &[VirtualMachine], vm_service: &VirtualMachineService) -> Result<String>;

    async fn ensure_load_balancer(&self, vm_service: &VirtualMachineService, network_name: &str) -> Result<()>;
}

/// Load balancer provider for clusters where an external component owns load balancing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLoadBalancerProvider;

#[async_trait]
impl LoadBalancerProvider for NoopLoadBalancerProvider {
    fn network_name(&self, _vms: &[VirtualMachine], _vm_service: &VirtualMachineService) -> Result<String> {
        Ok(String::new())
    }

    async fn ensure_load_balancer(&self, _vm_service: &VirtualMachineService, _network_name: &str) -> Result<()> {
        Ok(())
    }
}
