use std::sync::Arc;
use std::time::Duration;

use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use prometheus::IntGauge;
use tracing::{debug, error, info, instrument, trace};
use vmop_api::v1alpha1::condition::VIRTUAL_MACHINE_PREREQ_READY_CONDITION;
use vmop_api::{VirtualMachine, VirtualMachinePhase, VirtualMachinePowerState};
use vmop_core::record::emit_outcome;
use vmop_core::{conditions, CreateAdmission, CreatePermit, Error, EventRecorder, FeatureGates, PatchHelper, ProberManager, Result};
use vmop_provider::{VirtualMachineProvider, VmConfigArgs};

use super::instance_storage;
use super::resolver::Resolver;
use crate::finalizer;
use crate::metrics::Metrics;
use crate::store::VirtualMachineStore;

pub const FINALIZER: &str = "virtualmachine.vmoperator.vmware.com";

/// Fixed delay used while waiting for a create slot or an IP address
pub const REQUEUE_DELAY: Duration = Duration::from_secs(10);

pub struct VirtualMachineReconciler {
    pub store: Arc<dyn VirtualMachineStore>,
    pub provider: Arc<dyn VirtualMachineProvider>,
    pub recorder: Arc<dyn EventRecorder>,
    pub prober: Arc<dyn ProberManager>,
    pub admission: Arc<CreateAdmission>,
    pub features: FeatureGates,
    pub sync_period: Duration,
    pub metrics: Arc<Metrics>,
}

impl VirtualMachineReconciler {
    /// Reconcile the VirtualMachine `namespace/name` once
    ///
    /// Changes made to the object are written back on every exit. When both the reconcile
    /// and the write fail, the reconcile error is returned.
    #[instrument(skip(self), fields(vm = %format!("{}/{}", namespace, name)))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action> {
        let Some(mut vm) = self.store.get_vm(namespace, name).await? else {
            debug!("VirtualMachine no longer exists");
            return Ok(Action::await_change());
        };

        if vm.is_paused() {
            info!("Skipping reconcile of paused VirtualMachine");
            return Ok(Action::await_change());
        }

        let patch = PatchHelper::new(&vm)?;
        let deleting = vm.is_deleting();
        let outcome = if deleting {
            self.reconcile_delete(&mut vm).await
        } else {
            self.reconcile_normal(&mut vm).await
        };
        let persisted = self.persist(&patch, &vm, deleting).await;

        match (outcome, persisted) {
            (Err(e), Err(patch_err)) => {
                error!(error = %patch_err, "Failed to patch VirtualMachine");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(patch_err)) => Err(patch_err),
            (Ok(()), Ok(())) if deleting => Ok(Action::await_change()),
            (Ok(()), Ok(())) => Ok(match requeue_delay(&vm) {
                Some(delay) => Action::requeue(delay),
                None => Action::requeue(self.sync_period),
            }),
        }
    }

    async fn persist(&self, patch: &PatchHelper, vm: &VirtualMachine, deleting: bool) -> Result<()> {
        let changes = patch.changes(vm)?;
        if changes.is_empty() {
            trace!("No changes to persist");
            return Ok(());
        }
        let namespace = vm.namespace().unwrap_or_default();
        let name = vm.name_any();

        if let Some(object) = &changes.object {
            self.store.patch_vm(&namespace, &name, object).await?;
        }
        if let Some(status) = &changes.status {
            match self.store.patch_vm_status(&namespace, &name, status).await {
                Ok(_) => {}
                // The last finalizer was just removed
                Err(e) if deleting && e.is_not_found() => debug!("VirtualMachine gone before status write"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn reconcile_delete(&self, vm: &mut VirtualMachine) -> Result<()> {
        info!("Reconciling VirtualMachine deletion");

        if finalizer::contains(vm, FINALIZER) {
            vm.set_phase(VirtualMachinePhase::Deleting);
            self.delete_vm(vm).await?;
            vm.set_phase(VirtualMachinePhase::Deleted);
            finalizer::remove(vm, FINALIZER);
            info!("Provider completed deleting VirtualMachine");
        }

        self.prober.remove(vm).await;
        Ok(())
    }

    async fn delete_vm(&self, vm: &VirtualMachine) -> Result<()> {
        let result = match self.provider.delete(vm).await {
            Ok(()) => {
                debug!("Deleted VirtualMachine on provider");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("VirtualMachine to be deleted was not found on provider");
                Ok(())
            }
            Err(e) => {
                error!(op = "delete", error = %e, "Provider failed to delete VirtualMachine");
                Err(Error::from(e))
            }
        };
        emit_outcome(self.recorder.as_ref(), &vm.object_ref(&()), "Delete", result.as_ref().map(|_| ())).await;
        result
    }

    async fn reconcile_normal(&self, vm: &mut VirtualMachine) -> Result<()> {
        // Persisted before any provider mutation; the work continues on the next pass
        if !finalizer::contains(vm, FINALIZER) {
            finalizer::add(vm, FINALIZER);
            debug!("Added finalizer");
            return Ok(());
        }

        info!("Reconciling VirtualMachine");
        let initial_ip = vm.vm_ip().to_string();

        if let Err(e) = self.create_or_update(vm).await {
            error!(error = %e, "Failed to reconcile VirtualMachine");
            return Err(e);
        }

        if vm.vm_ip() != initial_ip && !vm.vm_ip().is_empty() {
            info!(ip = %vm.vm_ip(), "VirtualMachine was assigned an IP address");
        }

        self.prober.add(vm).await;
        Ok(())
    }

    async fn create_or_update(&self, vm: &mut VirtualMachine) -> Result<()> {
        let resolver = Resolver {
            store: self.store.as_ref(),
            provider: self.provider.as_ref(),
            features: self.features,
        };

        let vm_class = resolver.class(vm).await?;
        if self.features.instance_storage {
            instance_storage::reconcile_spec(vm, &vm_class);
        }
        let (vm_image, content_library_uuid) = resolver.image(vm).await?;
        let vm_metadata = resolver.metadata(vm).await?;
        let resource_policy = resolver.resource_policy(vm).await?;
        let storage_profile_id = resolver.storage_policy_id(vm).await?;

        conditions::mark_true(vm, VIRTUAL_MACHINE_PREREQ_READY_CONDITION);

        let args = VmConfigArgs {
            vm_class,
            vm_image,
            vm_metadata,
            resource_policy,
            storage_profile_id,
            content_library_uuid,
        };

        let exists = match self.provider.exists(vm).await {
            Ok(exists) => exists,
            Err(e) => {
                let err = Error::from(e);
                error!(op = "exists", error = %err, "Failed to check if VirtualMachine exists on provider");
                emit_outcome(self.recorder.as_ref(), &vm.object_ref(&()), "Exists", Err(&err)).await;
                return Err(err);
            }
        };

        if !exists {
            // Set first so a deferred create still requeues on the fixed delay
            vm.set_phase(VirtualMachinePhase::Creating);

            let Some(permit) = self.admission.try_acquire() else {
                info!(bound = self.admission.bound(), "No create slot available, deferring VirtualMachine create");
                self.metrics.vm_create_deferred_total.inc();
                return Ok(());
            };

            let _in_flight = InFlightCreate::new(permit, &self.metrics.vm_creates_in_flight);
            self.create_vm(vm, &args).await?;
        }

        if self.features.instance_storage && !instance_storage::placement_ready(vm) {
            debug!("Instance storage PVCs are not bound yet");
        } else {
            vm.set_phase(VirtualMachinePhase::Created);
        }

        if let Err(e) = self.provider.update(vm, &args).await {
            let err = Error::from(e);
            error!(op = "update", error = %err, "Provider failed to update VirtualMachine");
            emit_outcome(self.recorder.as_ref(), &vm.object_ref(&()), "Update", Err(&err)).await;
            return Err(err);
        }

        Ok(())
    }

    async fn create_vm(&self, vm: &mut VirtualMachine, args: &VmConfigArgs) -> Result<()> {
        if let Some(policy) = args.resource_policy.as_ref().filter(|p| p.is_deleting()) {
            let err = Error::ResourcePolicyDeleting(policy.name_any());
            error!(policy = %policy.name_any(), "Cannot create VirtualMachine while its resource policy is deleting");
            emit_outcome(self.recorder.as_ref(), &vm.object_ref(&()), "Create", Err(&err)).await;
            return Err(err);
        }

        match self.provider.create(vm, args).await {
            Ok(()) => {
                info!("Created VirtualMachine on provider");
                Ok(())
            }
            Err(e) => {
                let err = Error::from(e);
                error!(op = "create", error = %err, "Provider failed to create VirtualMachine");
                emit_outcome(self.recorder.as_ref(), &vm.object_ref(&()), "Create", Err(&err)).await;
                Err(err)
            }
        }
    }
}

/// Admission slot plus the in-flight gauge, both released when the create ends or is dropped
struct InFlightCreate<'a> {
    _permit: CreatePermit<'a>,
    gauge: &'a IntGauge,
}

impl<'a> InFlightCreate<'a> {
    fn new(permit: CreatePermit<'a>, gauge: &'a IntGauge) -> Self {
        gauge.inc();
        Self { _permit: permit, gauge }
    }
}

impl Drop for InFlightCreate<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Fixed requeue while a create is pending or a powered-on VM has no IP yet
pub fn requeue_delay(vm: &VirtualMachine) -> Option<Duration> {
    if vm.phase() == Some(VirtualMachinePhase::Creating) {
        return Some(REQUEUE_DELAY);
    }
    let powered_on = vm
        .status
        .as_ref()
        .is_some_and(|s| s.power_state == Some(VirtualMachinePowerState::PoweredOn));
    if powered_on && vm.vm_ip().is_empty() {
        return Some(REQUEUE_DELAY);
    }
    None
}
