//! Instance storage volumes generated from a VM's class

use kube::ResourceExt;
use tracing::{debug, info};
use vmop_api::v1alpha1::virtualmachine::{
    InstanceVolumeClaimVolumeSource, PersistentVolumeClaimVolumeSource, VirtualMachineVolume,
};
use vmop_api::v1alpha1::{INSTANCE_STORAGE_PVCS_BOUND_ANNOTATION, INSTANCE_STORAGE_PVC_NAME_PREFIX};
use vmop_api::{VirtualMachine, VirtualMachineClass, VirtualMachinePhase};

/// Append one PVC volume per instance storage volume of the class
///
/// Applied once: skipped when the VM is already created, already carries instance volumes,
/// or the class declares none. Returns whether the spec changed.
pub fn reconcile_spec(vm: &mut VirtualMachine, class: &VirtualMachineClass) -> bool {
    let key = vm.namespaced_name();
    if vm.phase() == Some(VirtualMachinePhase::Created) {
        debug!(vm = %key, "VM created, skipping instance volume patch");
        return false;
    }
    if vm.instance_storage_configured() {
        debug!(vm = %key, "VM spec already has instance volumes");
        return false;
    }
    let storage = &class.spec.hardware.instance_storage;
    if storage.volumes.is_empty() {
        debug!(vm = %key, class = %class.name_any(), "Class has no instance storage");
        return false;
    }

    for volume in &storage.volumes {
        let name = format!("{}{}", INSTANCE_STORAGE_PVC_NAME_PREFIX, uuid::Uuid::new_v4());
        vm.spec.volumes.push(VirtualMachineVolume {
            name: name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: name,
                read_only: false,
                instance_volume_claim: Some(InstanceVolumeClaimVolumeSource {
                    storage_class: storage.storage_class.clone(),
                    size: volume.size.0.clone(),
                }),
            }),
        });
    }
    info!(vm = %key, volumes = storage.volumes.len(), "Added instance storage volumes");
    true
}

/// Whether every instance storage PVC has been bound to a host
pub fn placement_ready(vm: &VirtualMachine) -> bool {
    !vm.instance_storage_configured() || vm.annotations().contains_key(INSTANCE_STORAGE_PVCS_BOUND_ANNOTATION)
}
