//! Plumbing shared by the controllers: API scoping, cached watches, result and error policy

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::{self, Store};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vmop_core::{Backoff, Error, Result};

use crate::metrics::Metrics;

/// Api over one namespace, or every namespace when `namespace` is `None`
pub fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// `namespace/name` of an object
pub fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Keep a cache of every object served by `api` for the mappers
pub fn spawn_reflector<K>(api: Api<K>) -> Store<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    <K as Resource>::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default())).default_backoff();
    tokio::spawn(async move {
        stream
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!(error = %e, "Watch error in object cache");
                }
            })
            .await;
    });
    reader
}

/// Convert a reconcile outcome into the controller's result, recording metrics
///
/// Success and explicit delayed requeues reset the object's backoff.
pub fn finish(
    result: Result<Action>,
    controller: &str,
    key: &str,
    elapsed: Duration,
    metrics: &Metrics,
    backoff: &Backoff,
) -> Result<Action> {
    match result {
        Ok(action) => {
            backoff.reset(key);
            metrics.observe_reconcile(controller, true, elapsed);
            Ok(action)
        }
        Err(Error::RequeueAfter(delay)) => {
            debug!(object = %key, delay = ?delay, "Requeueing after fixed delay");
            backoff.reset(key);
            metrics.observe_reconcile(controller, true, elapsed);
            Ok(Action::requeue(delay))
        }
        Err(e) => {
            metrics.observe_reconcile(controller, false, elapsed);
            Err(e)
        }
    }
}

/// Requeue delay after a failed reconcile
pub fn error_action(error: &Error, key: &str, backoff: &Backoff) -> Action {
    if error.is_conflict() {
        debug!(object = %key, "Stale write, requeueing with latest version");
        return Action::requeue(backoff.base());
    }
    let delay = backoff.next_delay(key);
    warn!(object = %key, error = %error, delay = ?delay, "Reconcile failed, retrying with backoff");
    Action::requeue(delay)
}
