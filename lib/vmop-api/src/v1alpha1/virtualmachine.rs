use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::{Condition, Conditioned};
use super::{PAUSE_ANNOTATION, TOPOLOGY_ZONE_LABEL};

/// VirtualMachine is the desired state of a virtual machine on the infrastructure provider
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    shortname = "vm",
    namespaced,
    derive = "Default",
    status = "VirtualMachineStatus",
    printcolumn = r#"{"name":"PowerState","type":"string","jsonPath":".status.powerState"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".status.vmIp"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Name of the cluster-scoped VirtualMachineImage to deploy from
    pub image_name: String,

    /// Name of the cluster-scoped VirtualMachineClass describing the hardware
    pub class_name: String,

    /// Desired power state
    #[serde(default)]
    pub power_state: VirtualMachinePowerState,

    /// Network interfaces attached to the VM
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<VirtualMachineNetworkInterface>,

    /// Ports exposed by the guest, used to resolve named service and probe ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<VirtualMachinePort>,

    /// Source of metadata handed to the guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_metadata: Option<VirtualMachineMetadata>,

    /// StorageClass whose storage policy backs the VM disks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,

    /// Name of a VirtualMachineSetResourcePolicy in the VM's namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_policy_name: String,

    /// Volumes attached to the VM
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VirtualMachineVolume>,

    /// Readiness probe evaluated by the prober and by VirtualMachineService endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

/// Observed state of a VirtualMachine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Host the VM is running on
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// Observed power state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<VirtualMachinePowerState>,

    /// Coarse lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<VirtualMachinePhase>,

    /// Primary IP address reported by the guest
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vm_ip: String,

    /// Provider identifier of the VM
    #[serde(rename = "uniqueID", default, skip_serializing_if = "String::is_empty")]
    pub unique_id: String,

    /// BIOS UUID of the VM
    #[serde(rename = "biosUUID", default, skip_serializing_if = "String::is_empty")]
    pub bios_uuid: String,

    /// Conditions describing the status
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Lifecycle phase of a VirtualMachine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VirtualMachinePhase {
    Creating,
    Created,
    Deleting,
    Deleted,
}

/// Power state of a VirtualMachine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VirtualMachinePowerState {
    #[default]
    #[serde(rename = "poweredOn")]
    PoweredOn,
    #[serde(rename = "poweredOff")]
    PoweredOff,
}

/// Network interface attachment
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineNetworkInterface {
    /// Network provider type, e.g. "nsx-t" or "vsphere-distributed"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_type: String,

    /// Name of the network to attach to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_name: String,
}

/// Port exposed by the guest
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachinePort {
    pub name: String,
    pub port: i32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// Metadata source transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VirtualMachineMetadataTransport {
    ExtraConfig,
    OvfEnv,
}

/// Reference to the ConfigMap or Secret holding guest metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineMetadata {
    /// ConfigMap in the VM's namespace; mutually exclusive with secretName
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_map_name: String,

    /// Secret in the VM's namespace; mutually exclusive with configMapName
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,

    /// How the metadata is handed to the guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<VirtualMachineMetadataTransport>,
}

/// Volume attached to a VirtualMachine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineVolume {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
}

/// PVC-backed volume source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimVolumeSource {
    pub claim_name: String,

    #[serde(default)]
    pub read_only: bool,

    /// Set when the claim was generated from the class's instance storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_volume_claim: Option<InstanceVolumeClaimVolumeSource>,
}

/// Instance storage claim parameters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceVolumeClaimVolumeSource {
    pub storage_class: String,
    pub size: String,
}

/// Readiness probe definition
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocketAction>,

    /// Connect timeout in seconds; 10 when unset or not positive
    #[serde(default)]
    pub timeout_seconds: i32,

    /// Interval between periodic probes in seconds
    #[serde(default)]
    pub period_seconds: i32,
}

/// TCP connect probe
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TcpSocketAction {
    /// Port number, or the name of a TCP port in spec.ports
    pub port: IntOrString,

    /// Host to dial; the VM IP when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

impl VirtualMachine {
    /// `namespace/name` identity used in logs and prober keys
    pub fn namespaced_name(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Whether reconciliation is paused by annotation
    pub fn is_paused(&self) -> bool {
        self.annotations().contains_key(PAUSE_ANNOTATION)
    }

    /// Whether the object is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Option<VirtualMachinePhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Set the lifecycle phase, populating the status if necessary
    pub fn set_phase(&mut self, phase: VirtualMachinePhase) {
        self.status.get_or_insert_with(Default::default).phase = Some(phase);
    }

    /// Availability zone label, empty when unset
    pub fn zone(&self) -> &str {
        self.labels()
            .get(TOPOLOGY_ZONE_LABEL)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Observed IP address, empty when not yet assigned
    pub fn vm_ip(&self) -> &str {
        self.status.as_ref().map(|s| s.vm_ip.as_str()).unwrap_or("")
    }

    /// Host the VM runs on, empty when unknown
    pub fn host(&self) -> &str {
        self.status.as_ref().map(|s| s.host.as_str()).unwrap_or("")
    }

    /// Whether the spec already carries volumes generated from instance storage
    pub fn instance_storage_configured(&self) -> bool {
        self.spec.volumes.iter().any(|v| {
            v.persistent_volume_claim
                .as_ref()
                .is_some_and(|pvc| pvc.instance_volume_claim.is_some())
        })
    }

    /// Labels used for selector matching
    pub fn selector_labels(&self) -> &BTreeMap<String, String> {
        self.labels()
    }
}

impl Conditioned for VirtualMachine {
    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

fn default_protocol() -> String {
    "TCP".to_string()
}
