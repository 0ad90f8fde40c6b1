//! Diff-based patching of reconciled objects
//!
//! A [`PatchHelper`] snapshots an object when a reconcile starts. On every exit the
//! reconciler asks it for the [`Changes`] made since, as RFC 7386 merge patches: one for
//! the object itself (finalizers, annotations, labels and spec) and one for the status
//! subresource. Unchanged sections produce no patch at all.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::Result;

const METADATA_FIELDS: [&str; 3] = ["finalizers", "annotations", "labels"];

/// Merge patches computed by [`PatchHelper::changes`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes {
    /// Metadata and spec patch, carrying the snapshot's resourceVersion
    pub object: Option<Value>,
    /// Patch for the status subresource
    pub status: Option<Value>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.status.is_none()
    }
}

pub struct PatchHelper {
    before: Value,
}

impl PatchHelper {
    pub fn new<K: Serialize>(obj: &K) -> Result<Self> {
        Ok(Self {
            before: serde_json::to_value(obj)?,
        })
    }

    pub fn changes<K: Serialize>(&self, obj: &K) -> Result<Changes> {
        let after = serde_json::to_value(obj)?;

        let metadata = merge_diff(&metadata_subset(&self.before), &metadata_subset(&after));
        let spec = merge_diff(section(&self.before, "spec"), section(&after, "spec"));

        let object = if metadata.is_some() || spec.is_some() {
            let mut metadata = match metadata {
                Some(Value::Object(m)) => m,
                _ => Map::new(),
            };
            if let Some(rv) = self.before.pointer("/metadata/resourceVersion") {
                metadata.insert("resourceVersion".to_string(), rv.clone());
            }
            let mut patch = Map::new();
            patch.insert("metadata".to_string(), Value::Object(metadata));
            if let Some(spec) = spec {
                patch.insert("spec".to_string(), spec);
            }
            Some(Value::Object(patch))
        } else {
            None
        };

        let status = merge_diff(section(&self.before, "status"), section(&after, "status"))
            .map(|diff| json!({ "status": diff }));

        Ok(Changes { object, status })
    }
}

fn section<'a>(obj: &'a Value, key: &str) -> &'a Value {
    obj.get(key).unwrap_or(&Value::Null)
}

fn metadata_subset(obj: &Value) -> Value {
    let mut subset = Map::new();
    if let Some(Value::Object(metadata)) = obj.get("metadata") {
        for field in METADATA_FIELDS {
            if let Some(v) = metadata.get(field) {
                subset.insert(field.to_string(), v.clone());
            }
        }
    }
    Value::Object(subset)
}

/// Merge patch turning `before` into `after`, or `None` when they are equal
pub fn merge_diff(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut diff = Map::new();
            for (key, after_value) in a {
                match b.get(key) {
                    Some(before_value) => {
                        if let Some(d) = merge_diff(before_value, after_value) {
                            diff.insert(key.clone(), d);
                        }
                    }
                    None => {
                        diff.insert(key.clone(), after_value.clone());
                    }
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    diff.insert(key.clone(), Value::Null);
                }
            }
            (!diff.is_empty()).then_some(Value::Object(diff))
        }
        _ if before == after => None,
        _ => Some(after.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmop_api::v1alpha1::virtualmachine::{VirtualMachinePhase, VirtualMachineSpec};
    use vmop_api::VirtualMachine;

    fn vm() -> VirtualMachine {
        let mut vm = VirtualMachine::new("vm", VirtualMachineSpec {
            class_name: "small".to_string(),
            image_name: "photon".to_string(),
            ..Default::default()
        });
        vm.metadata.namespace = Some("ns".to_string());
        vm.metadata.resource_version = Some("7".to_string());
        vm
    }

    #[test]
    fn test_no_changes() {
        let vm = vm();
        let helper = PatchHelper::new(&vm).unwrap();
        assert!(helper.changes(&vm).unwrap().is_empty());
    }

    #[test]
    fn test_finalizer_patch_carries_resource_version() {
        let mut vm = vm();
        let helper = PatchHelper::new(&vm).unwrap();
        vm.metadata.finalizers = Some(vec!["virtualmachine.vmoperator.vmware.com".to_string()]);

        let changes = helper.changes(&vm).unwrap();
        assert_eq!(
            changes.object,
            Some(json!({
                "metadata": {
                    "finalizers": ["virtualmachine.vmoperator.vmware.com"],
                    "resourceVersion": "7"
                }
            }))
        );
        assert_eq!(changes.status, None);
    }

    #[test]
    fn test_finalizer_removal_is_null() {
        let mut vm = vm();
        vm.metadata.finalizers = Some(vec!["f".to_string()]);
        let helper = PatchHelper::new(&vm).unwrap();
        vm.metadata.finalizers = None;

        let changes = helper.changes(&vm).unwrap();
        assert_eq!(changes.object.unwrap()["metadata"]["finalizers"], Value::Null);
    }

    #[test]
    fn test_status_only() {
        let mut vm = vm();
        let helper = PatchHelper::new(&vm).unwrap();
        vm.set_phase(VirtualMachinePhase::Creating);

        let changes = helper.changes(&vm).unwrap();
        assert_eq!(changes.object, None);
        assert_eq!(changes.status, Some(json!({"status": {"phase": "Creating"}})));
    }

    #[test]
    fn test_ignores_unrelated_metadata() {
        let mut vm = vm();
        let helper = PatchHelper::new(&vm).unwrap();
        vm.metadata.resource_version = Some("8".to_string());
        vm.metadata.generation = Some(3);
        assert!(helper.changes(&vm).unwrap().is_empty());
    }

    #[test]
    fn test_diff_applies_back() {
        let before = json!({"spec": {"volumes": [], "ports": [{"port": 22}]}, "x": 1});
        let after = json!({"spec": {"volumes": [{"name": "v"}]}, "y": 2});
        let diff = merge_diff(&before, &after).unwrap();
        let mut patched = before.clone();
        json_patch::merge(&mut patched, &diff);
        assert_eq!(patched, after);
    }
}
