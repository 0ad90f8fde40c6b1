use async_trait::async_trait;
use vmop_api::{VirtualMachine, VirtualMachineSetResourcePolicy};

use crate::{Result, VmConfigArgs};

/// Virtualization platform operations used by the VirtualMachine controller
///
/// `create` and `update` may write observed state (IP, host, power state, identifiers)
/// into the VM's status. `update` must be idempotent; it is called on every reconcile.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VirtualMachineProvider: Send + Sync {
    /// Whether the VM exists on the platform
    async fn exists(&self, vm: &VirtualMachine) -> Result<bool>;

    async fn create(&self, vm: &mut VirtualMachine, args: &VmConfigArgs) -> Result<()>;

    async fn update(&self, vm: &mut VirtualMachine, args: &VmConfigArgs) -> Result<()>;

    /// Delete the VM; [`crate::ProviderError::NotFound`] reports it was already gone
    async fn delete(&self, vm: &VirtualMachine) -> Result<()>;

    /// Whether the resource pool and folder backing `policy` exist in `zone`
    async fn is_resource_policy_ready(
        &self,
        zone: &str,
        policy: &VirtualMachineSetResourcePolicy,
    ) -> Result<bool>;
}
