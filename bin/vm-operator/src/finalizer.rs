//! Finalizer bookkeeping on object metadata

use kube::Resource;

pub fn contains<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

pub fn add<K: Resource>(obj: &mut K, finalizer: &str) {
    if !contains(obj, finalizer) {
        obj.meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(finalizer.to_string());
    }
}

/// Remove `finalizer`, dropping the list entirely once it is empty
pub fn remove<K: Resource>(obj: &mut K, finalizer: &str) {
    let meta = obj.meta_mut();
    if let Some(finalizers) = meta.finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
        if finalizers.is_empty() {
            meta.finalizers = None;
        }
    }
}
