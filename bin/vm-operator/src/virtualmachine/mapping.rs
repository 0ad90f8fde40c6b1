//! Fan-out from binding events to the VirtualMachines they affect
//!
//! Each event scans the current object snapshots in full; there is no index.

use std::collections::HashSet;
use std::sync::Arc;

use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use tracing::debug;
use vmop_api::v1alpha1::CONTENT_SOURCE_KIND;
use vmop_api::{
    ContentLibraryProvider, ContentSource, ContentSourceBinding, VirtualMachine, VirtualMachineClassBinding,
    VirtualMachineImage,
};

fn request(vm: &VirtualMachine) -> ObjectRef<VirtualMachine> {
    ObjectRef::from_obj(vm)
}

/// VMs in the binding's namespace whose class is the bound class
pub fn vms_for_class_binding(
    binding: &VirtualMachineClassBinding,
    vms: &[Arc<VirtualMachine>],
) -> Vec<ObjectRef<VirtualMachine>> {
    let namespace = binding.namespace();
    let class_name = &binding.spec.class_ref.name;

    let requests: Vec<_> = vms
        .iter()
        .filter(|vm| vm.namespace() == namespace && &vm.spec.class_name == class_name)
        .map(|vm| request(vm))
        .collect();
    debug!(
        binding = %binding.name_any(),
        class = %class_name,
        requests = requests.len(),
        "Mapped VirtualMachineClassBinding to VirtualMachines"
    );
    requests
}

/// VMs in the binding's namespace using an image published by the bound content source
///
/// The chain is binding, ContentSource, its ContentLibraryProviders (named by the source's
/// providerRef or owned by the source), the images owned by those providers, then the VMs
/// referencing one of those images.
pub fn vms_for_content_source_binding(
    binding: &ContentSourceBinding,
    content_sources: &[Arc<ContentSource>],
    providers: &[Arc<ContentLibraryProvider>],
    images: &[Arc<VirtualMachineImage>],
    vms: &[Arc<VirtualMachine>],
) -> Vec<ObjectRef<VirtualMachine>> {
    let Some(source) = content_sources
        .iter()
        .find(|cs| cs.name_any() == binding.spec.content_source_ref.name)
    else {
        debug!(binding = %binding.name_any(), "ContentSource of binding not found");
        return Vec::new();
    };
    let source_uid = source.meta().uid.clone().unwrap_or_default();

    let provider_uids: HashSet<String> = providers
        .iter()
        .filter(|p| {
            p.name_any() == source.spec.provider_ref.name
                || p.owner_references()
                    .iter()
                    .any(|o| o.kind == CONTENT_SOURCE_KIND && !source_uid.is_empty() && o.uid == source_uid)
        })
        .filter_map(|p| p.meta().uid.clone())
        .collect();

    let image_names: HashSet<String> = images
        .iter()
        .filter(|img| provider_uids.iter().any(|uid| img.is_owned_by_provider(uid)))
        .map(|img| img.name_any())
        .collect();

    let namespace = binding.namespace();
    let requests: Vec<_> = vms
        .iter()
        .filter(|vm| vm.namespace() == namespace && image_names.contains(&vm.spec.image_name))
        .map(|vm| request(vm))
        .collect();
    debug!(
        binding = %binding.name_any(),
        images = image_names.len(),
        requests = requests.len(),
        "Mapped ContentSourceBinding to VirtualMachines"
    );
    requests
}
