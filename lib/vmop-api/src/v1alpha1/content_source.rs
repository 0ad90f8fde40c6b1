use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::CONTENT_SOURCE_KIND;

/// ContentLibraryProvider describes a content library backing a ContentSource
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "ContentLibraryProvider",
    plural = "contentlibraryproviders",
    derive = "Default",
    printcolumn = r#"{"name":"UUID","type":"string","jsonPath":".spec.uuid"}"#,
)]
pub struct ContentLibraryProviderSpec {
    /// Provider identifier of the content library
    #[serde(default)]
    pub uuid: String,
}

impl ContentLibraryProvider {
    /// Name of the ContentSource owning this provider, if any
    pub fn content_source_owner(&self) -> Option<&str> {
        self.meta()
            .owner_references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|o| o.kind == CONTENT_SOURCE_KIND)
            .map(|o| o.name.as_str())
    }
}

/// ContentSource is a cluster-scoped publication point for images
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "ContentSource",
    plural = "contentsources",
    derive = "Default",
)]
#[serde(rename_all = "camelCase")]
pub struct ContentSourceSpec {
    /// Provider serving this content source
    pub provider_ref: ContentProviderReference,
}

/// Typed reference to a content provider or content source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentProviderReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub name: String,
}

/// ContentSourceBinding grants its namespace access to the images of a ContentSource
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmoperator.vmware.com",
    version = "v1alpha1",
    kind = "ContentSourceBinding",
    plural = "contentsourcebindings",
    namespaced,
    derive = "Default",
    printcolumn = r#"{"name":"ContentSource","type":"string","jsonPath":".spec.contentSourceRef.name"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ContentSourceBindingSpec {
    pub content_source_ref: ContentProviderReference,
}

impl ContentSourceBinding {
    /// Whether this binding grants the named content source
    pub fn binds(&self, content_source: &str) -> bool {
        self.spec.content_source_ref.kind == CONTENT_SOURCE_KIND
            && self.spec.content_source_ref.name == content_source
    }
}
