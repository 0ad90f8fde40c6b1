use std::collections::BTreeMap;

use vmop_api::v1alpha1::virtualmachine::VirtualMachineMetadataTransport;
use vmop_api::{VirtualMachineClass, VirtualMachineImage, VirtualMachineSetResourcePolicy};

/// Guest metadata read from the ConfigMap or Secret a VM references
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VmMetadata {
    pub data: BTreeMap<String, String>,
    pub transport: Option<VirtualMachineMetadataTransport>,
}

/// Every dependency of a VirtualMachine, resolved once per reconcile
///
/// The provider receives this bundle as-is and never looks up dependencies itself.
#[derive(Clone, Debug, Default)]
pub struct VmConfigArgs {
    pub vm_class: VirtualMachineClass,
    pub vm_image: VirtualMachineImage,
    pub vm_metadata: VmMetadata,
    pub resource_policy: Option<VirtualMachineSetResourcePolicy>,
    pub storage_profile_id: String,
    pub content_library_uuid: String,
}
