//! API version v1alpha1 for VM Operator CRDs

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub mod condition;
pub mod content_source;
pub mod resource_policy;
pub mod virtualmachine;
pub mod virtualmachine_class;
pub mod virtualmachine_image;
pub mod virtualmachine_service;

pub use condition::{Condition, ConditionSeverity, ConditionStatus, Conditioned};
pub use content_source::{ContentLibraryProvider, ContentSource, ContentSourceBinding};
pub use resource_policy::VirtualMachineSetResourcePolicy;
pub use virtualmachine::{VirtualMachine, VirtualMachinePhase, VirtualMachinePowerState};
pub use virtualmachine_class::{VirtualMachineClass, VirtualMachineClassBinding};
pub use virtualmachine_image::VirtualMachineImage;
pub use virtualmachine_service::{VirtualMachineService, VirtualMachineServiceType};

/// API group for VM Operator resources
pub const API_GROUP: &str = "vmoperator.vmware.com";
/// API version for VM Operator resources
pub const API_VERSION: &str = "v1alpha1";

/// Annotation that pauses VirtualMachine reconciliation while the VM is restored externally
pub const PAUSE_ANNOTATION: &str = "vmoperator.vmware.com/paused";

/// Annotation set once every instance storage PVC of a VM has been bound to a host
pub const INSTANCE_STORAGE_PVCS_BOUND_ANNOTATION: &str =
    "vmoperator.vmware.com/instance-storage-pvcs-bound";

/// Name prefix for PVCs generated from a class's instance storage volumes
pub const INSTANCE_STORAGE_PVC_NAME_PREFIX: &str = "instance-pvc-";

/// Well-known topology label naming the availability zone of a VM
pub const TOPOLOGY_ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// StorageClass parameter carrying the provider storage policy id
pub const STORAGE_POLICY_ID_PARAMETER: &str = "storagePolicyID";

/// Owner reference kind linking an image to its ContentLibraryProvider
pub const CONTENT_LIBRARY_PROVIDER_KIND: &str = "ContentLibraryProvider";
/// Owner reference kind linking a ContentLibraryProvider to its ContentSource
pub const CONTENT_SOURCE_KIND: &str = "ContentSource";
/// Reference kind used by VirtualMachineClassBinding
pub const VIRTUAL_MACHINE_CLASS_KIND: &str = "VirtualMachineClass";

/// Returns the concatenated `apiVersion` of this group
pub fn api_version() -> String {
    format!("{}/{}", API_GROUP, API_VERSION)
}

/// Definitions of every custom resource in this version
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        VirtualMachine::crd(),
        VirtualMachineClass::crd(),
        VirtualMachineClassBinding::crd(),
        VirtualMachineImage::crd(),
        ContentLibraryProvider::crd(),
        ContentSource::crd(),
        ContentSourceBinding::crd(),
        VirtualMachineSetResourcePolicy::crd(),
        VirtualMachineService::crd(),
    ]
}
