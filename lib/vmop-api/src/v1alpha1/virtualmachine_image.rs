use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::CONTENT_LIBRARY_PROVIDER_KIND;

/// VirtualMachineImage is a deployable image published by a content library
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "VirtualMachineImage",
    plural = "virtualmachineimages",
    shortname = "vmimage",
    derive = "Default",
    status = "VirtualMachineImageStatus",
    printcolumn = r#"{"name":"ImageID","type":"string","jsonPath":".spec.imageID"}"#,
    printcolumn = r#"{"name":"OS","type":"string","jsonPath":".spec.osInfo.type"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImageSpec {
    /// Image format, e.g. "ovf"
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_source_type: String,

    /// Provider identifier of the library item
    #[serde(rename = "imageID", default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,

    #[serde(default)]
    pub product_info: VirtualMachineImageProductInfo,

    #[serde(default)]
    pub os_info: VirtualMachineImageOsInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImageProductInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vendor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineImageOsInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineImageStatus {
    #[serde(rename = "guestOSCustomizable", default)]
    pub guest_os_customizable: bool,
}

impl VirtualMachineImage {
    /// Name of the ContentLibraryProvider owning this image, if any
    pub fn content_library_provider_owner(&self) -> Option<&str> {
        self.meta()
            .owner_references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|o| o.kind == CONTENT_LIBRARY_PROVIDER_KIND)
            .map(|o| o.name.as_str())
    }

    /// Whether this image is owned by the ContentLibraryProvider with the given uid
    pub fn is_owned_by_provider(&self, provider_uid: &str) -> bool {
        self.meta()
            .owner_references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|o| o.kind == CONTENT_LIBRARY_PROVIDER_KIND && o.uid == provider_uid)
    }
}
