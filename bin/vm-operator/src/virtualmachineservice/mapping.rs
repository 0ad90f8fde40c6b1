use std::sync::Arc;

use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use tracing::trace;
use vmop_api::{VirtualMachine, VirtualMachineService};

/// VirtualMachineServices in the VM's namespace whose selector matches its labels
pub fn services_for_vm(
    vm: &VirtualMachine,
    vm_services: &[Arc<VirtualMachineService>],
) -> Vec<ObjectRef<VirtualMachineService>> {
    let namespace = vm.namespace();
    vm_services
        .iter()
        .filter(|svc| svc.namespace() == namespace && svc.selects(vm.selector_labels()))
        .map(|svc| {
            trace!(vm = %vm.namespaced_name(), service = %svc.name_any(), "VM event maps to VirtualMachineService");
            ObjectRef::from_obj(svc.as_ref())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use vmop_api::VirtualMachineServiceType;

    #[test]
    fn test_services_selecting_vm() {
        let mut elsewhere = testing::vm_service("db-other", VirtualMachineServiceType::ClusterIP, "db");
        elsewhere.metadata.namespace = Some("other".to_string());
        let services = vec![
            Arc::new(testing::vm_service("db", VirtualMachineServiceType::ClusterIP, "db")),
            Arc::new(testing::vm_service("web", VirtualMachineServiceType::LoadBalancer, "web")),
            Arc::new(elsewhere),
        ];

        let requests = services_for_vm(&testing::running_vm("db-0", "db", ""), &services);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "db");

        assert!(services_for_vm(&testing::vm("bare", "small", "photon"), &services).is_empty());
    }
}
