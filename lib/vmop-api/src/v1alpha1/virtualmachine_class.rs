use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::VIRTUAL_MACHINE_CLASS_KIND;

/// VirtualMachineClass is a cluster-scoped hardware and resource template
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachineClass",
    plural = "virtualmachineclasses",
    shortname = "vmclass",
    derive = "Default",
    printcolumn = r#"{"name":"CPU","type":"string","jsonPath":".spec.hardware.cpus"}"#,
    printcolumn = r#"{"name":"Memory","type":"string","jsonPath":".spec.hardware.memory"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassSpec {
    #[serde(default)]
    pub hardware: VirtualMachineClassHardware,

    #[serde(default)]
    pub policies: VirtualMachineClassPolicies,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassHardware {
    #[serde(default)]
    pub cpus: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,

    /// Host-local storage provisioned alongside the VM
    #[serde(default)]
    pub instance_storage: InstanceStorage,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStorage {
    /// StorageClass used for every generated instance storage PVC
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<InstanceStorageVolume>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InstanceStorageVolume {
    pub size: Quantity,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineClassPolicies {
    #[serde(default)]
    pub resources: VirtualMachineClassResources,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineClassResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

/// VirtualMachineClassBinding grants its namespace access to a VirtualMachineClass
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachineClassBinding",
    plural = "virtualmachineclassbindings",
    namespaced,
    derive = "Default",
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.classRef.name"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineClassBindingSpec {
    pub class_ref: ClassReference,
}

/// Typed reference to a cluster-scoped class
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub name: String,
}

impl VirtualMachineClassBinding {
    /// Whether this binding grants the named class
    pub fn binds(&self, class_name: &str) -> bool {
        self.spec.class_ref.kind == VIRTUAL_MACHINE_CLASS_KIND && self.spec.class_ref.name == class_name
    }
}
