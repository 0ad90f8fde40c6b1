//! In-memory object store and fixtures for reconciler tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Secret, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use vmop_api::v1alpha1::content_source::{
    ContentLibraryProviderSpec, ContentProviderReference, ContentSourceBindingSpec, ContentSourceSpec,
};
use vmop_api::v1alpha1::virtualmachine::{VirtualMachineSpec, VirtualMachineStatus};
use vmop_api::v1alpha1::virtualmachine_class::{
    ClassReference, VirtualMachineClassBindingSpec, VirtualMachineClassSpec,
};
use vmop_api::v1alpha1::virtualmachine_image::VirtualMachineImageSpec;
use vmop_api::v1alpha1::virtualmachine_service::{
    VirtualMachineServicePort, VirtualMachineServiceSpec, VirtualMachineServiceType,
};
use vmop_api::v1alpha1::{CONTENT_LIBRARY_PROVIDER_KIND, CONTENT_SOURCE_KIND, VIRTUAL_MACHINE_CLASS_KIND};
use vmop_api::{
    ContentLibraryProvider, ContentSource, ContentSourceBinding, VirtualMachine, VirtualMachineClass,
    VirtualMachineClassBinding, VirtualMachineImage, VirtualMachineService, VirtualMachineSetResourcePolicy,
};
use vmop_core::error::{api_conflict, api_not_found};
use vmop_core::{Error, Result};

use crate::store::{VirtualMachineServiceStore, VirtualMachineStore};

#[derive(Clone, Copy)]
enum Subresource {
    Main,
    Status,
}

/// Objects of one kind keyed by namespace and name
pub struct Objects<K> {
    kind: &'static str,
    items: Mutex<BTreeMap<(String, String), K>>,
}

impl<K> Objects<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(obj: &K) -> (String, String) {
        let meta = obj.meta();
        (
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    pub fn insert(&self, mut obj: K) {
        if obj.meta().resource_version.is_none() {
            obj.meta_mut().resource_version = Some("1".to_string());
        }
        self.items.lock().unwrap().insert(Self::key(&obj), obj);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.items
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn list(&self, namespace: &str) -> Vec<K> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Apply a merge patch the way the API server does, removing objects whose last finalizer
    /// was cleared while deleting
    fn patch(&self, namespace: &str, name: &str, patch: &Value, subresource: Subresource) -> Result<K> {
        let mut items = self.items.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let current = items
            .get(&key)
            .ok_or_else(|| Error::Kube(api_not_found(self.kind, name)))?;
        let mut value = serde_json::to_value(current)?;

        if let Some(rv) = patch.pointer("/metadata/resourceVersion") {
            if value.pointer("/metadata/resourceVersion") != Some(rv) {
                return Err(Error::Kube(api_conflict(self.kind, name)));
            }
        }

        let mut effective = Map::new();
        if let Value::Object(fields) = patch {
            for (field, v) in fields {
                let keep = match subresource {
                    Subresource::Main => field != "status",
                    Subresource::Status => field == "status",
                };
                if keep {
                    effective.insert(field.clone(), v.clone());
                }
            }
        }
        json_patch::merge(&mut value, &Value::Object(effective));
        let next = next_resource_version(&value);
        value["metadata"]["resourceVersion"] = Value::String(next);

        let obj: K = serde_json::from_value(value)?;
        let meta = obj.meta();
        let finalized = meta.finalizers.as_ref().map_or(true, |f| f.is_empty());
        if meta.deletion_timestamp.is_some() && finalized {
            items.remove(&key);
        } else {
            items.insert(key, obj.clone());
        }
        Ok(obj)
    }

    fn create(&self, obj: &K) -> Result<K> {
        let mut items = self.items.lock().unwrap();
        let key = Self::key(obj);
        if items.contains_key(&key) {
            return Err(Error::Kube(api_conflict(self.kind, &key.1)));
        }
        let mut created = obj.clone();
        created.meta_mut().resource_version = Some("1".to_string());
        items.insert(key, created.clone());
        Ok(created)
    }

    fn replace(&self, obj: &K) -> Result<K> {
        let mut items = self.items.lock().unwrap();
        let key = Self::key(obj);
        let current = items
            .get(&key)
            .ok_or_else(|| Error::Kube(api_not_found(self.kind, &key.1)))?;
        if obj.meta().resource_version.is_some() && obj.meta().resource_version != current.meta().resource_version {
            return Err(Error::Kube(api_conflict(self.kind, &key.1)));
        }
        let rv = current
            .meta()
            .resource_version
            .as_deref()
            .and_then(|rv| rv.parse::<u64>().ok())
            .unwrap_or(0);
        let mut replaced = obj.clone();
        replaced.meta_mut().resource_version = Some((rv + 1).to_string());
        items.insert(key, replaced.clone());
        Ok(replaced)
    }
}

fn next_resource_version(value: &Value) -> String {
    let current = value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0);
    (current + 1).to_string()
}

/// Store fake backing both reconcilers in tests
pub struct FakeStore {
    pub vms: Objects<VirtualMachine>,
    pub classes: Objects<VirtualMachineClass>,
    pub class_bindings: Objects<VirtualMachineClassBinding>,
    pub images: Objects<VirtualMachineImage>,
    pub content_library_providers: Objects<ContentLibraryProvider>,
    pub content_sources: Objects<ContentSource>,
    pub content_source_bindings: Objects<ContentSourceBinding>,
    pub config_maps: Objects<ConfigMap>,
    pub secrets: Objects<Secret>,
    pub resource_policies: Objects<VirtualMachineSetResourcePolicy>,
    pub storage_classes: Objects<StorageClass>,
    pub vm_services: Objects<VirtualMachineService>,
    pub services: Objects<Service>,
    pub endpoints: Objects<Endpoints>,
    writes: Mutex<Vec<String>>,
    reject_writes: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            vms: Objects::new("virtualmachines"),
            classes: Objects::new("virtualmachineclasses"),
            class_bindings: Objects::new("virtualmachineclassbindings"),
            images: Objects::new("virtualmachineimages"),
            content_library_providers: Objects::new("contentlibraryproviders"),
            content_sources: Objects::new("contentsources"),
            content_source_bindings: Objects::new("contentsourcebindings"),
            config_maps: Objects::new("configmaps"),
            secrets: Objects::new("secrets"),
            resource_policies: Objects::new("virtualmachinesetresourcepolicies"),
            storage_classes: Objects::new("storageclasses"),
            vm_services: Objects::new("virtualmachineservices"),
            services: Objects::new("services"),
            endpoints: Objects::new("endpoints"),
            writes: Mutex::new(Vec::new()),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Writes performed so far, as `<operation> <namespace>/<name>`
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Fail every subsequent write with a conflict
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn record(&self, op: &str, namespace: &str, name: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(format!("{} {}/{}", op, namespace, name));
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::Kube(api_conflict(op, name)));
        }
        Ok(())
    }
}

#[async_trait]
impl VirtualMachineStore for FakeStore {
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>> {
        Ok(self.vms.get(namespace, name))
    }

    async fn patch_vm(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine> {
        self.record("patch_vm", namespace, name)?;
        self.vms.patch(namespace, name, patch, Subresource::Main)
    }

    async fn patch_vm_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine> {
        self.record("patch_vm_status", namespace, name)?;
        self.vms.patch(namespace, name, patch, Subresource::Status)
    }

    async fn get_class(&self, name: &str) -> Result<Option<VirtualMachineClass>> {
        Ok(self.classes.get("", name))
    }

    async fn list_class_bindings(&self, namespace: &str) -> Result<Vec<VirtualMachineClassBinding>> {
        Ok(self.class_bindings.list(namespace))
    }

    async fn get_image(&self, name: &str) -> Result<Option<VirtualMachineImage>> {
        Ok(self.images.get("", name))
    }

    async fn get_content_library_provider(&self, name: &str) -> Result<Option<ContentLibraryProvider>> {
        Ok(self.content_library_providers.get("", name))
    }

    async fn get_content_source(&self, name: &str) -> Result<Option<ContentSource>> {
        Ok(self.content_sources.get("", name))
    }

    async fn list_content_source_bindings(&self, namespace: &str) -> Result<Vec<ContentSourceBinding>> {
        Ok(self.content_source_bindings.list(namespace))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_maps.get(namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets.get(namespace, name))
    }

    async fn get_resource_policy(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSetResourcePolicy>> {
        Ok(self.resource_policies.get(namespace, name))
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        Ok(self.storage_classes.get("", name))
    }
}

#[async_trait]
impl VirtualMachineServiceStore for FakeStore {
    async fn get_vm_service(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineService>> {
        Ok(self.vm_services.get(namespace, name))
    }

    async fn patch_vm_service(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService> {
        self.record("patch_vm_service", namespace, name)?;
        self.vm_services.patch(namespace, name, patch, Subresource::Main)
    }

    async fn patch_vm_service_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachineService> {
        self.record("patch_vm_service_status", namespace, name)?;
        self.vm_services.patch(namespace, name, patch, Subresource::Status)
    }

    async fn list_vms(&self, namespace: &str) -> Result<Vec<VirtualMachine>> {
        Ok(self.vms.list(namespace))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.services.get(namespace, name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let (ns, name) = Objects::<Service>::key(service);
        self.record("create_service", &ns, &name)?;
        self.services.create(service)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service> {
        let (ns, name) = Objects::<Service>::key(service);
        self.record("replace_service", &ns, &name)?;
        self.services.replace(service)
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        Ok(self.endpoints.get(namespace, name))
    }

    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints> {
        let (ns, name) = Objects::<Endpoints>::key(endpoints);
        self.record("create_endpoints", &ns, &name)?;
        self.endpoints.create(endpoints)
    }

    async fn replace_endpoints(&self, endpoints: &Endpoints) -> Result<Endpoints> {
        let (ns, name) = Objects::<Endpoints>::key(endpoints);
        self.record("replace_endpoints", &ns, &name)?;
        self.endpoints.replace(endpoints)
    }
}

/// Namespace used by the fixtures
pub const NAMESPACE: &str = "dev";

pub fn vm(name: &str, class_name: &str, image_name: &str) -> VirtualMachine {
    let mut vm = VirtualMachine::new(name, VirtualMachineSpec {
        class_name: class_name.to_string(),
        image_name: image_name.to_string(),
        ..Default::default()
    });
    vm.metadata.namespace = Some(NAMESPACE.to_string());
    vm.metadata.uid = Some(format!("uid-{}", name));
    vm
}

pub fn class(name: &str) -> VirtualMachineClass {
    let mut class = VirtualMachineClass::new(name, VirtualMachineClassSpec::default());
    class.spec.hardware.cpus = 2;
    class
}

pub fn class_binding(namespace: &str, class_name: &str) -> VirtualMachineClassBinding {
    let mut binding = VirtualMachineClassBinding::new(class_name, VirtualMachineClassBindingSpec {
        class_ref: ClassReference {
            kind: VIRTUAL_MACHINE_CLASS_KIND.to_string(),
            name: class_name.to_string(),
            ..Default::default()
        },
    });
    binding.metadata.namespace = Some(namespace.to_string());
    binding
}

fn owner(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: vmop_api::v1alpha1::api_version(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        ..Default::default()
    }
}

pub fn content_source(name: &str, provider: &str) -> ContentSource {
    let mut cs = ContentSource::new(name, ContentSourceSpec {
        provider_ref: ContentProviderReference {
            kind: CONTENT_LIBRARY_PROVIDER_KIND.to_string(),
            name: provider.to_string(),
            ..Default::default()
        },
    });
    cs.metadata.uid = Some(format!("uid-{}", name));
    cs
}

pub fn content_library_provider(name: &str, uuid: &str, content_source: &str) -> ContentLibraryProvider {
    let mut clp = ContentLibraryProvider::new(name, ContentLibraryProviderSpec { uuid: uuid.to_string() });
    clp.metadata.uid = Some(format!("uid-{}", name));
    clp.metadata.owner_references = Some(vec![owner(CONTENT_SOURCE_KIND, content_source)]);
    clp
}

pub fn image(name: &str, provider: &str) -> VirtualMachineImage {
    let mut image = VirtualMachineImage::new(name, VirtualMachineImageSpec::default());
    image.metadata.owner_references = Some(vec![owner(CONTENT_LIBRARY_PROVIDER_KIND, provider)]);
    image
}

pub fn content_source_binding(namespace: &str, content_source: &str) -> ContentSourceBinding {
    let mut binding = ContentSourceBinding::new(content_source, ContentSourceBindingSpec {
        content_source_ref: ContentProviderReference {
            kind: CONTENT_SOURCE_KIND.to_string(),
            name: content_source.to_string(),
            ..Default::default()
        },
    });
    binding.metadata.namespace = Some(namespace.to_string());
    binding
}

/// Store holding class `small` and image `photon` from content library `lib-1`, both bound
/// into [`NAMESPACE`]
pub fn populated_store() -> FakeStore {
    let store = FakeStore::new();
    store.classes.insert(class("small"));
    store.class_bindings.insert(class_binding(NAMESPACE, "small"));
    store.content_sources.insert(content_source("cs", "clp"));
    store
        .content_library_providers
        .insert(content_library_provider("clp", "lib-1", "cs"));
    store.images.insert(image("photon", "clp"));
    store
        .content_source_bindings
        .insert(content_source_binding(NAMESPACE, "cs"));
    store
}

/// Mark an object as being deleted
pub fn deleting<K: Resource>(mut obj: K) -> K {
    obj.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
    obj
}

/// VirtualMachineService selecting `app=<app>` with one `ssh` port 22 -> 22
pub fn vm_service(name: &str, type_: VirtualMachineServiceType, app: &str) -> VirtualMachineService {
    let mut svc = VirtualMachineService::new(name, VirtualMachineServiceSpec {
        type_,
        ports: vec![VirtualMachineServicePort {
            name: "ssh".to_string(),
            protocol: "TCP".to_string(),
            port: 22,
            target_port: 22,
        }],
        selector: BTreeMap::from([("app".to_string(), app.to_string())]),
        ..Default::default()
    });
    svc.metadata.namespace = Some(NAMESPACE.to_string());
    svc.metadata.uid = Some(format!("uid-{}", name));
    svc
}

/// VM labelled `app=<app>` with an assigned IP and host
pub fn running_vm(name: &str, app: &str, ip: &str) -> VirtualMachine {
    let mut vm = vm(name, "small", "photon");
    vm.metadata.labels = Some(BTreeMap::from([("app".to_string(), app.to_string())]));
    vm.status = Some(VirtualMachineStatus {
        host: "esx-01".to_string(),
        vm_ip: ip.to_string(),
        ..Default::default()
    });
    vm
}
