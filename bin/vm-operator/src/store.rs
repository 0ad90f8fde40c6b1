//! Typed access to the cluster object store used by the reconcilers

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Secret, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use vmop_api::{
    ContentLibraryProvider, ContentSource, ContentSourceBinding, VirtualMachine,
    VirtualMachineClass, VirtualMachineClassBinding, VirtualMachineImage, VirtualMachineService,
    VirtualMachineSetResourcePolicy,
};
use vmop_core::Result;

/// Reads and writes performed by the VirtualMachine controller
///
/// `get_*` return `None` when the object does not exist. Patches are RFC 7386 merge patches.
#[async_trait]
pub trait VirtualMachineStore: Send + Sync {
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>>;
    async fn patch_vm(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine>;
    async fn patch_vm_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine>;

    async fn get_class(&self, name: &str) -> Result<Option<VirtualMachineClass>>;
    async fn list_class_bindings(&self, namespace: &str) -> Result<Vec<VirtualMachineClassBinding>>;

    async fn get_image(&self, name: &str) -> Result<Option<VirtualMachineImage>>;
    async fn get_content_library_provider(&self, name: &str) -> Result<Option<ContentLibraryProvider>>;
    async fn get_content_source(&self, name: &str) -> Result<Option<ContentSource>>;
    async fn list_content_source_bindings(&self, namespace: &str) -> Result<Vec<ContentSourceBinding>>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
    async fn get_resource_policy(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSetResourcePolicy>>;
    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>>;
}

/// Reads and writes performed by the VirtualMachineService controller
#[async_trait]
pub trait VirtualMachineServiceStore: Send + Sync {
    async fn get_vm_service(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineService>>;
    async fn patch_vm_service(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService>;
    async fn patch_vm_service_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService>;

    async fn list_vms(&self, namespace: &str) -> Result<Vec<VirtualMachine>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
    async fn create_service(&self, service: &Service) -> Result<Service>;
    async fn replace_service(&self, service: &Service) -> Result<Service>;

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>>;
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints>;
    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints>;
}

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: kube::Resource,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl VirtualMachineStore for KubeStore {
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>> {
        Ok(self.namespaced::<VirtualMachine>(namespace).get_opt(name).await?)
    }

    async fn patch_vm(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine> {
        let api = self.namespaced::<VirtualMachine>(namespace);
        Ok(api.patch(name, &PatchParams::default(), &Patch::Merge(patch)).await?)
    }

    async fn patch_vm_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine> {
        let api = self.namespaced::<VirtualMachine>(namespace);
        Ok(api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch)).await?)
    }

    async fn get_class(&self, name: &str) -> Result<Option<VirtualMachineClass>> {
        Ok(self.cluster::<VirtualMachineClass>().get_opt(name).await?)
    }

    async fn list_class_bindings(&self, namespace: &str) -> Result<Vec<VirtualMachineClassBinding>> {
        let list = self
            .namespaced::<VirtualMachineClassBinding>(namespace)
            .list(&Default::default())
            .await?;
        Ok(list.items)
    }

    async fn get_image(&self, name: &str) -> Result<Option<VirtualMachineImage>> {
        Ok(self.cluster::<VirtualMachineImage>().get_opt(name).await?)
    }

    async fn get_content_library_provider(&self, name: &str) -> Result<Option<ContentLibraryProvider>> {
        Ok(self.cluster::<ContentLibraryProvider>().get_opt(name).await?)
    }

    async fn get_content_source(&self, name: &str) -> Result<Option<ContentSource>> {
        Ok(self.cluster::<ContentSource>().get_opt(name).await?)
    }

    async fn list_content_source_bindings(&self, namespace: &str) -> Result<Vec<ContentSourceBinding>> {
        let list = self
            .namespaced::<ContentSourceBinding>(namespace)
            .list(&Default::default())
            .await?;
        Ok(list.items)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.namespaced::<ConfigMap>(namespace).get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.namespaced::<Secret>(namespace).get_opt(name).await?)
    }

    async fn get_resource_policy(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSetResourcePolicy>> {
        Ok(self
            .namespaced::<VirtualMachineSetResourcePolicy>(namespace)
            .get_opt(name)
            .await?)
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        Ok(self.cluster::<StorageClass>().get_opt(name).await?)
    }
}

#[async_trait]
impl VirtualMachineServiceStore for KubeStore {
    async fn get_vm_service(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineService>> {
        Ok(self.namespaced::<VirtualMachineService>(namespace).get_opt(name).await?)
    }

    async fn patch_vm_service(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService> {
        let api = self.namespaced::<VirtualMachineService>(namespace);
        Ok(api.patch(name, &PatchParams::default(), &Patch::Merge(patch)).await?)
    }

    async fn patch_vm_service_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService> {
        let api = self.namespaced::<VirtualMachineService>(namespace);
        Ok(api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch)).await?)
    }

    async fn list_vms(&self, namespace: &str) -> Result<Vec<VirtualMachine>> {
        let list = self
            .namespaced::<VirtualMachine>(namespace)
            .list(&Default::default())
            .await?;
        Ok(list.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.namespaced::<Service>(namespace).get_opt(name).await?)
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let api = self.namespaced::<Service>(&service.namespace().unwrap_or_default());
        Ok(api.create(&PostParams::default(), service).await?)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service> {
        let api = self.namespaced::<Service>(&service.namespace().unwrap_or_default());
        Ok(api.replace(&service.name_any(), &PostParams::default(), service).await?)
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        Ok(self.namespaced::<Endpoints>(namespace).get_opt(name).await?)
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints> {
        let api = self.namespaced::<Endpoints>(&endpoints.namespace().unwrap_or_default());
        Ok(api.create(&PostParams::default(), endpoints).await?)
    }

    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints> {
        let api = self.namespaced::<Endpoints>(&endpoints.namespace().unwrap_or_default());
        Ok(api.replace(&endpoints.name_any(), &PostParams::default(), endpoints).await?)
    }
}
