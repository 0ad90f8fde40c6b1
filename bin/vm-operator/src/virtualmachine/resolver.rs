//! Resolution of the objects a VirtualMachine depends on
//!
//! Every failure marks the prerequisites condition false with a reason and the error text
//! before it is returned, so the cause is visible on the VM itself.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::{debug, warn};
use vmop_api::v1alpha1::condition::{
    CONTENT_LIBRARY_PROVIDER_NOT_FOUND_REASON, CONTENT_SOURCE_BINDING_NOT_FOUND_REASON,
    RESOURCE_POLICY_NOT_FOUND_REASON, RESOURCE_POLICY_NOT_READY_REASON, STORAGE_CLASS_NOT_FOUND_REASON,
    VIRTUAL_MACHINE_CLASS_BINDING_NOT_FOUND_REASON, VIRTUAL_MACHINE_CLASS_NOT_FOUND_REASON,
    VIRTUAL_MACHINE_IMAGE_NOT_FOUND_REASON, VIRTUAL_MACHINE_METADATA_CONFLICT_REASON,
    VIRTUAL_MACHINE_METADATA_NOT_FOUND_REASON, VIRTUAL_MACHINE_PREREQ_READY_CONDITION,
};
use vmop_api::v1alpha1::{CONTENT_LIBRARY_PROVIDER_KIND, CONTENT_SOURCE_KIND, STORAGE_POLICY_ID_PARAMETER};
use vmop_api::{
    ConditionSeverity, VirtualMachine, VirtualMachineClass, VirtualMachineImage, VirtualMachineSetResourcePolicy,
};
use vmop_core::{conditions, Error, FeatureGates, Result};
use vmop_provider::{VirtualMachineProvider, VmMetadata};

use crate::store::VirtualMachineStore;

pub struct Resolver<'a> {
    pub store: &'a dyn VirtualMachineStore,
    pub provider: &'a dyn VirtualMachineProvider,
    pub features: FeatureGates,
}

fn required<T>(found: Result<Option<T>>, kind: &'static str, name: &str) -> Result<T> {
    found?.ok_or_else(|| Error::not_found(kind, name))
}

fn fail(vm: &mut VirtualMachine, reason: &str, err: Error) -> Error {
    warn!(vm = %vm.namespaced_name(), reason, error = %err, "VirtualMachine prerequisite not met");
    conditions::mark_false(
        vm,
        VIRTUAL_MACHINE_PREREQ_READY_CONDITION,
        reason,
        ConditionSeverity::Error,
        err.to_string(),
    );
    err
}

impl Resolver<'_> {
    /// The VM's class, visible to its namespace through a binding when enforcement is on
    pub async fn class(&self, vm: &mut VirtualMachine) -> Result<VirtualMachineClass> {
        let name = vm.spec.class_name.clone();
        let namespace = vm.namespace().unwrap_or_default();

        let class = required(self.store.get_class(&name).await, "VirtualMachineClass", &name)
            .map_err(|e| fail(vm, VIRTUAL_MACHINE_CLASS_NOT_FOUND_REASON, e))?;

        if self.features.vm_service {
            let bindings = self
                .store
                .list_class_bindings(&namespace)
                .await
                .map_err(|e| fail(vm, VIRTUAL_MACHINE_CLASS_BINDING_NOT_FOUND_REASON, e))?;
            if !bindings.iter().any(|b| b.binds(&name)) {
                let err = Error::binding_not_found("VirtualMachineClass", name, namespace);
                return Err(fail(vm, VIRTUAL_MACHINE_CLASS_BINDING_NOT_FOUND_REASON, err));
            }
        }

        Ok(class)
    }

    /// The VM's image and the UUID of the content library publishing it
    ///
    /// Provenance is read from owner references: image, then ContentLibraryProvider, then
    /// ContentSource. With enforcement on, a ContentSourceBinding in the VM's namespace must
    /// reference that ContentSource.
    pub async fn image(&self, vm: &mut VirtualMachine) -> Result<(VirtualMachineImage, String)> {
        let name = vm.spec.image_name.clone();
        let namespace = vm.namespace().unwrap_or_default();

        let image = required(self.store.get_image(&name).await, "VirtualMachineImage", &name)
            .map_err(|e| fail(vm, VIRTUAL_MACHINE_IMAGE_NOT_FOUND_REASON, e))?;

        let provider_name = match image.content_library_provider_owner() {
            Some(owner) => owner.to_string(),
            None => {
                let err = Error::missing_owner("VirtualMachineImage", &name, CONTENT_LIBRARY_PROVIDER_KIND);
                return Err(fail(vm, CONTENT_LIBRARY_PROVIDER_NOT_FOUND_REASON, err));
            }
        };
        let provider = required(
            self.store.get_content_library_provider(&provider_name).await,
            "ContentLibraryProvider",
            &provider_name,
        )
        .map_err(|e| fail(vm, CONTENT_LIBRARY_PROVIDER_NOT_FOUND_REASON, e))?;
        let library_uuid = provider.spec.uuid.clone();

        if self.features.vm_service {
            let source_name = match provider.content_source_owner() {
                Some(owner) => owner.to_string(),
                None => {
                    let err = Error::missing_owner("ContentLibraryProvider", &provider_name, CONTENT_SOURCE_KIND);
                    return Err(fail(vm, CONTENT_SOURCE_BINDING_NOT_FOUND_REASON, err));
                }
            };
            let source = required(
                self.store.get_content_source(&source_name).await,
                "ContentSource",
                &source_name,
            )
            .map_err(|e| fail(vm, CONTENT_SOURCE_BINDING_NOT_FOUND_REASON, e))?;

            let bindings = self
                .store
                .list_content_source_bindings(&namespace)
                .await
                .map_err(|e| fail(vm, CONTENT_SOURCE_BINDING_NOT_FOUND_REASON, e))?;
            if !bindings.iter().any(|b| b.binds(&source.name_any())) {
                let err = Error::binding_not_found("VirtualMachineImage", name, namespace);
                return Err(fail(vm, CONTENT_SOURCE_BINDING_NOT_FOUND_REASON, err));
            }
        }

        debug!(vm = %vm.namespaced_name(), image = %name, library = %library_uuid, "Resolved image");
        Ok((image, library_uuid))
    }

    /// Guest metadata from the referenced ConfigMap or Secret
    pub async fn metadata(&self, vm: &mut VirtualMachine) -> Result<VmMetadata> {
        let Some(source) = vm.spec.vm_metadata.clone() else {
            return Ok(VmMetadata::default());
        };
        if !source.config_map_name.is_empty() && !source.secret_name.is_empty() {
            return Err(fail(vm, VIRTUAL_MACHINE_METADATA_CONFLICT_REASON, Error::MetadataConflict));
        }
        let namespace = vm.namespace().unwrap_or_default();

        let data = if !source.config_map_name.is_empty() {
            let name = &source.config_map_name;
            required(self.store.get_config_map(&namespace, name).await, "ConfigMap", name)
                .map_err(|e| fail(vm, VIRTUAL_MACHINE_METADATA_NOT_FOUND_REASON, e))?
                .data
                .unwrap_or_default()
        } else if !source.secret_name.is_empty() {
            let name = &source.secret_name;
            let secret = required(self.store.get_secret(&namespace, name).await, "Secret", name)
                .map_err(|e| fail(vm, VIRTUAL_MACHINE_METADATA_NOT_FOUND_REASON, e))?;
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(VmMetadata {
            data,
            transport: source.transport,
        })
    }

    /// The named resource policy, which the provider must report ready in the VM's zone
    pub async fn resource_policy(&self, vm: &mut VirtualMachine) -> Result<Option<VirtualMachineSetResourcePolicy>> {
        if vm.spec.resource_policy_name.is_empty() {
            return Ok(None);
        }
        let name = vm.spec.resource_policy_name.clone();
        let namespace = vm.namespace().unwrap_or_default();

        let policy = required(
            self.store.get_resource_policy(&namespace, &name).await,
            "VirtualMachineSetResourcePolicy",
            &name,
        )
        .map_err(|e| fail(vm, RESOURCE_POLICY_NOT_FOUND_REASON, e))?;

        let zone = vm.zone().to_string();
        let ready = self
            .provider
            .is_resource_policy_ready(&zone, &policy)
            .await
            .map_err(|e| fail(vm, RESOURCE_POLICY_NOT_READY_REASON, e.into()))?;
        if !ready {
            return Err(fail(vm, RESOURCE_POLICY_NOT_READY_REASON, Error::ResourcePolicyNotReady(name)));
        }

        Ok(Some(policy))
    }

    /// Provider storage policy of the VM's StorageClass, empty when none is named
    pub async fn storage_policy_id(&self, vm: &mut VirtualMachine) -> Result<String> {
        if vm.spec.storage_class.is_empty() {
            return Ok(String::new());
        }
        let name = vm.spec.storage_class.clone();
        let class = required(self.store.get_storage_class(&name).await, "StorageClass", &name)
            .map_err(|e| fail(vm, STORAGE_CLASS_NOT_FOUND_REASON, e))?;

        Ok(class
            .parameters
            .and_then(|mut p| p.remove(STORAGE_POLICY_ID_PARAMETER))
            .unwrap_or_default())
    }
}
