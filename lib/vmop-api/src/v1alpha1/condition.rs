use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set once every dependency of a VirtualMachine has been resolved
pub const VIRTUAL_MACHINE_PREREQ_READY_CONDITION: &str = "VirtualMachinePrereqReady";

// Reasons reported on the VirtualMachinePrereqReady condition
pub const VIRTUAL_MACHINE_CLASS_NOT_FOUND_REASON: &str = "VirtualMachineClassNotFound";
pub const VIRTUAL_MACHINE_CLASS_BINDING_NOT_FOUND_REASON: &str = "VirtualMachineClassBindingNotFound";
pub const VIRTUAL_MACHINE_IMAGE_NOT_FOUND_REASON: &str = "VirtualMachineImageNotFound";
pub const CONTENT_LIBRARY_PROVIDER_NOT_FOUND_REASON: &str = "ContentLibraryProviderNotFound";
pub const CONTENT_SOURCE_BINDING_NOT_FOUND_REASON: &str = "ContentSourceBindingNotFound";
pub const VIRTUAL_MACHINE_METADATA_NOT_FOUND_REASON: &str = "VirtualMachineMetadataNotFound";
pub const VIRTUAL_MACHINE_METADATA_CONFLICT_REASON: &str = "VirtualMachineMetadataConflict";
pub const RESOURCE_POLICY_NOT_FOUND_REASON: &str = "ResourcePolicyNotFound";
pub const RESOURCE_POLICY_NOT_READY_REASON: &str = "ResourcePolicyNotReady";
pub const STORAGE_CLASS_NOT_FOUND_REASON: &str = "StorageClassNotFound";

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Severity of a condition that is not True
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
}

/// Condition describes one observed aspect of a resource's state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status: True, False, Unknown
    pub status: ConditionStatus,

    /// Severity of the condition; only set when status is not True
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Last time the condition changed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    /// Machine-readable reason in CamelCase
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    /// Whether this condition currently reports True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Resources that carry a list of conditions in their status
pub trait Conditioned {
    /// Current conditions, empty when the status has not been populated
    fn conditions(&self) -> &[Condition];

    /// Mutable conditions, populating an empty status if necessary
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}
