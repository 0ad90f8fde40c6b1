use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// VirtualMachineSetResourcePolicy groups VMs into a resource pool, folder and cluster modules
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachineSetResourcePolicy",
    plural = "virtualmachinesetresourcepolicies",
    namespaced,
    derive = "Default",
)]
pub struct VirtualMachineSetResourcePolicySpec {
    #[serde(default)]
    pub resourcepool: ResourcePoolSpec,

    #[serde(default)]
    pub folder: FolderSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clustermodules: Vec<ClusterModuleSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourcePoolSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reservations: BTreeMap<String, Quantity>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FolderSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterModuleSpec {
    pub groupname: String,
}

impl VirtualMachineSetResourcePolicy {
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
