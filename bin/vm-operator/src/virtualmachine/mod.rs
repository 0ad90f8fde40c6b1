//! VirtualMachine controller

pub mod instance_storage;
pub mod mapping;
pub mod reconciler;
pub mod resolver;

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use tracing::{debug, info};
use vmop_api::{
    ContentLibraryProvider, ContentSource, ContentSourceBinding, VirtualMachine, VirtualMachineClassBinding,
    VirtualMachineImage,
};
use vmop_core::{Backoff, ControllerIdentity, Error, ManagerConfig, Result};

use crate::controller::{api, error_action, finish, object_key, spawn_reflector};
use crate::metrics::Metrics;
pub use reconciler::VirtualMachineReconciler;

pub const IDENTITY: ControllerIdentity = ControllerIdentity::new("VirtualMachine", "virtualmachine-controller");

pub struct Context {
    pub reconciler: VirtualMachineReconciler,
    pub metrics: Arc<Metrics>,
    pub backoff: Backoff,
}

async fn reconcile(vm: Arc<VirtualMachine>, ctx: Arc<Context>) -> Result<Action> {
    let key = object_key(vm.as_ref());
    let start = Instant::now();
    let result = ctx
        .reconciler
        .reconcile(&vm.namespace().unwrap_or_default(), &vm.name_any())
        .await;
    finish(result, IDENTITY.short_name, &key, start.elapsed(), &ctx.metrics, &ctx.backoff)
}

fn error_policy(vm: Arc<VirtualMachine>, error: &Error, ctx: Arc<Context>) -> Action {
    error_action(error, &object_key(vm.as_ref()), &ctx.backoff)
}

/// Run the controller until a shutdown signal is received
pub async fn run(client: Client, config: &ManagerConfig, ctx: Arc<Context>) {
    let namespace = config.watch_namespace.as_deref();
    let concurrency = u16::try_from(config.max_concurrent_reconciles).unwrap_or(u16::MAX);
    info!(
        controller = IDENTITY.short_name,
        concurrency,
        namespace = namespace.unwrap_or("*"),
        "Starting VirtualMachine controller"
    );

    let controller = Controller::new(api::<VirtualMachine>(&client, namespace), watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency));

    let class_vms = controller.store();
    let source_vms = controller.store();
    let sources = spawn_reflector(Api::<ContentSource>::all(client.clone()));
    let providers = spawn_reflector(Api::<ContentLibraryProvider>::all(client.clone()));
    let images = spawn_reflector(Api::<VirtualMachineImage>::all(client.clone()));

    controller
        .watches(
            api::<VirtualMachineClassBinding>(&client, namespace),
            watcher::Config::default(),
            move |binding| mapping::vms_for_class_binding(&binding, &class_vms.state()),
        )
        .watches(
            api::<ContentSourceBinding>(&client, namespace),
            watcher::Config::default(),
            move |binding| {
                mapping::vms_for_content_source_binding(
                    &binding,
                    &sources.state(),
                    &providers.state(),
                    &images.state(),
                    &source_vms.state(),
                )
            },
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((vm, action)) => debug!(vm = %vm, action = ?action, "Reconciled VirtualMachine"),
                Err(e) => debug!(error = %e, "VirtualMachine reconcile failed"),
            }
        })
        .await;

    info!(controller = IDENTITY.short_name, "VirtualMachine controller stopped");
}
