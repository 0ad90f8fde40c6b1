use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// VirtualMachineService exposes a set of VirtualMachines selected by label
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachineService",
    plural = "virtualmachineservices",
    shortname = "vmservice",
    namespaced,
    derive = "Default",
    status = "VirtualMachineServiceStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineServiceSpec {
    #[serde(rename = "type", default)]
    pub type_: VirtualMachineServiceType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<VirtualMachineServicePort>,

    /// Labels a VirtualMachine must carry to be selected; empty selects every VM in the namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    #[serde(rename = "loadBalancerIP", default, skip_serializing_if = "String::is_empty")]
    pub load_balancer_ip: String,

    #[serde(rename = "clusterIP", default, skip_serializing_if = "String::is_empty")]
    pub cluster_ip: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VirtualMachineServiceType {
    #[default]
    ClusterIP,
    LoadBalancer,
    ExternalName,
}

impl VirtualMachineServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::LoadBalancer => "LoadBalancer",
            Self::ExternalName => "ExternalName",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineServicePort {
    pub name: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub port: i32,

    /// Port on the VirtualMachine traffic is forwarded to
    pub target_port: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineServiceStatus {
    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadBalancerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadBalancerIngress {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

impl VirtualMachineService {
    /// Whether a VM carrying `labels` is selected by this service
    pub fn selects(&self, labels: &BTreeMap<String, String>) -> bool {
        self.spec
            .selector
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

fn default_protocol() -> String {
    "TCP".to_string()
}
