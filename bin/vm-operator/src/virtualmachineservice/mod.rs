//! VirtualMachineService controller
//!
//! Translates each VirtualMachineService into a selector-less native Service and keeps its
//! Endpoints in sync with the ready VirtualMachines the service selects.

pub mod endpoints;
pub mod mapping;
pub mod reconciler;
pub mod service;

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use tracing::{debug, info};
use vmop_api::{VirtualMachine, VirtualMachineService};
use vmop_core::{Backoff, ControllerIdentity, Error, ManagerConfig, Result};

use crate::controller::{api, error_action, finish, object_key};
use crate::metrics::Metrics;
pub use reconciler::VirtualMachineServiceReconciler;

pub const IDENTITY: ControllerIdentity =
    ControllerIdentity::new("VirtualMachineService", "virtualmachineservice-controller");

pub struct Context {
    pub reconciler: VirtualMachineServiceReconciler,
    pub metrics: Arc<Metrics>,
    pub backoff: Backoff,
}

async fn reconcile(vm_service: Arc<VirtualMachineService>, ctx: Arc<Context>) -> Result<Action> {
    let key = object_key(vm_service.as_ref());
    let start = Instant::now();
    let result = ctx
        .reconciler
        .reconcile(&vm_service.namespace().unwrap_or_default(), &vm_service.name_any())
        .await;
    finish(result, IDENTITY.short_name, &key, start.elapsed(), &ctx.metrics, &ctx.backoff)
}

fn error_policy(vm_service: Arc<VirtualMachineService>, error: &Error, ctx: Arc<Context>) -> Action {
    error_action(error, &object_key(vm_service.as_ref()), &ctx.backoff)
}

pub async fn run(client: Client, config: &ManagerConfig, ctx: Arc<Context>) {
    let namespace = config.watch_namespace.as_deref();
    let concurrency = u16::try_from(config.max_concurrent_reconciles).unwrap_or(u16::MAX);
    info!(
        controller = IDENTITY.short_name,
        concurrency,
        namespace = namespace.unwrap_or("*"),
        "Starting VirtualMachineService controller"
    );

    let controller = Controller::new(
        api::<VirtualMachineService>(&client, namespace),
        watcher::Config::default(),
    )
    .with_config(controller::Config::default().concurrency(concurrency));
    let vm_services = controller.store();

    controller
        .owns(api::<Service>(&client, namespace), watcher::Config::default())
        .owns(api::<Endpoints>(&client, namespace), watcher::Config::default())
        .watches(
            api::<VirtualMachine>(&client, namespace),
            watcher::Config::default(),
            move |vm| mapping::services_for_vm(&vm, &vm_services.state()),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((svc, action)) => debug!(vmservice = %svc, action = ?action, "Reconciled VirtualMachineService"),
                Err(e) => debug!(error = %e, "VirtualMachineService reconcile failed"),
            }
        })
        .await;

    info!(controller = IDENTITY.short_name, "VirtualMachineService controller stopped");
}
