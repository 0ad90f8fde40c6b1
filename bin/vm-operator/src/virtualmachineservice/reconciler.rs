use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, error, info, instrument, trace};
use vmop_api::{VirtualMachine, VirtualMachineService};
use vmop_core::probe::ReadinessProber;
use vmop_core::record::emit_outcome;
use vmop_core::{Error, EventRecorder, PatchHelper, Result};
use vmop_provider::LoadBalancerProvider;

use super::{endpoints, service};
use crate::finalizer;
use crate::store::VirtualMachineServiceStore;

pub const FINALIZER: &str = "virtualmachineservice.vmoperator.vmware.com";

/// Requeue delay while every selected VM fails its readiness probe
pub const PROBE_FAILURE_REQUEUE_DELAY: Duration = Duration::from_secs(10);

const OP_CREATE: &str = "CreateVMService";
const OP_DELETE: &str = "DeleteVMService";

pub struct VirtualMachineServiceReconciler {
    pub store: Arc<dyn VirtualMachineServiceStore>,
    pub load_balancer: Arc<dyn LoadBalancerProvider>,
    pub prober: Arc<dyn ReadinessProber>,
    pub recorder: Arc<dyn EventRecorder>,
    pub sync_period: Duration,
}

impl VirtualMachineServiceReconciler {
    #[instrument(skip(self), fields(vmservice = %format!("{}/{}", namespace, name)))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action> {
        let Some(mut vm_service) = self.store.get_vm_service(namespace, name).await? else {
            debug!("VirtualMachineService no longer exists");
            return Ok(Action::await_change());
        };

        if vm_service.is_deleting() {
            if finalizer::contains(&vm_service, FINALIZER) {
                let patch = PatchHelper::new(&vm_service)?;
                self.reconcile_delete(&vm_service).await;
                finalizer::remove(&mut vm_service, FINALIZER);
                self.persist(&patch, &vm_service, true).await?;
            }
            return Ok(Action::await_change());
        }

        if !finalizer::contains(&vm_service, FINALIZER) {
            let patch = PatchHelper::new(&vm_service)?;
            finalizer::add(&mut vm_service, FINALIZER);
            self.persist(&patch, &vm_service, false).await?;
            debug!("Added finalizer");
        }

        let patch = PatchHelper::new(&vm_service)?;
        let outcome = self.reconcile_normal(&mut vm_service).await;
        let persisted = self.persist(&patch, &vm_service, false).await;
        match (outcome, persisted) {
            (Err(e), Err(patch_err)) => {
                error!(error = %patch_err, "Failed to patch VirtualMachineService");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(patch_err)) => Err(patch_err),
            (Ok(()), Ok(())) => Ok(Action::requeue(self.sync_period)),
        }
    }

    async fn persist(&self, patch: &PatchHelper, vm_service: &VirtualMachineService, deleting: bool) -> Result<()> {
        let changes = patch.changes(vm_service)?;
        let namespace = vm_service.namespace().unwrap_or_default();
        let name = vm_service.name_any();

        if let Some(object) = &changes.object {
            self.store.patch_vm_service(&namespace, &name, object).await?;
        }
        if let Some(status) = &changes.status {
            match self.store.patch_vm_service_status(&namespace, &name, status).await {
                Ok(_) => {}
                Err(e) if deleting && e.is_not_found() => debug!("VirtualMachineService gone before status write"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// The owned Service and Endpoints are garbage collected through their owner reference
    async fn reconcile_delete(&self, vm_service: &VirtualMachineService) {
        info!("Deleting VirtualMachineService");
        emit_outcome::<Error>(self.recorder.as_ref(), &vm_service.object_ref(&()), OP_DELETE, Ok(())).await;
    }

    async fn reconcile_normal(&self, vm_service: &mut VirtualMachineService) -> Result<()> {
        info!(type_ = vm_service.spec.type_.as_str(), "Reconciling VirtualMachineService");
        let namespace = vm_service.namespace().unwrap_or_default();
        let vms: Vec<VirtualMachine> = self
            .store
            .list_vms(&namespace)
            .await?
            .into_iter()
            .filter(|vm| vm_service.selects(vm.selector_labels()))
            .collect();

        if service::is_load_balancer(vm_service) {
            let network_name = self.load_balancer.network_name(&vms, vm_service)?;
            if let Err(e) = self.load_balancer.ensure_load_balancer(vm_service, &network_name).await {
                error!(op = "ensure_load_balancer", error = %e, "Failed to provision load balancer");
                return Err(e.into());
            }
            debug!(network = %network_name, "Load balancer ensured");
        }

        let service = self.reconcile_service(vm_service).await?;
        self.reconcile_endpoints(vm_service, &service, &vms).await?;

        if service::is_load_balancer(vm_service) {
            let ingress = service::load_balancer_ingress(&service);
            let recorded = vm_service
                .status
                .as_ref()
                .map(|s| s.load_balancer.ingress.as_slice())
                .unwrap_or(&[]);
            if !ingress.is_empty() && recorded != ingress.as_slice() {
                info!(ingress = ingress.len(), "Recording load balancer ingress");
                vm_service.status.get_or_insert_with(Default::default).load_balancer.ingress = ingress;
            }
        }
        Ok(())
    }

    async fn reconcile_service(&self, vm_service: &VirtualMachineService) -> Result<Service> {
        let desired = service::desired_service(vm_service);
        let namespace = vm_service.namespace().unwrap_or_default();

        match self.store.get_service(&namespace, &vm_service.name_any()).await? {
            None => {
                info!("Creating Service");
                let created = self.store.create_service(&desired).await;
                emit_outcome(
                    self.recorder.as_ref(),
                    &vm_service.object_ref(&()),
                    OP_CREATE,
                    created.as_ref().map(|_| ()),
                )
                .await;
                created
            }
            Some(current) => match service::updated_service(&current, &desired) {
                Some(next) => {
                    info!("Updating Service");
                    self.store.replace_service(&next).await
                }
                None => {
                    trace!("Service up to date");
                    Ok(current)
                }
            },
        }
    }

    async fn reconcile_endpoints(
        &self,
        vm_service: &VirtualMachineService,
        service: &Service,
        vms: &[VirtualMachine],
    ) -> Result<()> {
        let computed = endpoints::compute(service, vms, self.prober.as_ref()).await;
        if computed.all_probes_failed() {
            info!(
                selected = computed.selected,
                "Every selected VM failed its readiness probe, keeping Endpoints"
            );
            return Err(Error::RequeueAfter(PROBE_FAILURE_REQUEUE_DELAY));
        }

        let namespace = vm_service.namespace().unwrap_or_default();
        match self.store.get_endpoints(&namespace, &vm_service.name_any()).await? {
            None => {
                info!(subsets = computed.subsets.len(), "Creating Endpoints");
                let created = endpoints::endpoints(vm_service, None, computed.subsets);
                self.store.create_endpoints(&created).await?;
            }
            Some(current) if endpoints::subsets_of(&current) == computed.subsets.as_slice() => {
                trace!("Endpoints up to date");
            }
            Some(current) => {
                info!(subsets = computed.subsets.len(), "Updating Endpoints");
                let next = endpoints::endpoints(vm_service, Some(&current), computed.subsets);
                self.store.replace_endpoints(&next).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeStore, NAMESPACE};
    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointSubset, LoadBalancerIngress as ServiceIngress, LoadBalancerStatus, ServiceStatus,
    };
    use vmop_api::VirtualMachineServiceType;
    use vmop_core::probe::{MockReadinessProber, ProbeResult};
    use vmop_core::record::MockEventRecorder;
    use vmop_core::EventKind;
    use vmop_provider::{MockLoadBalancerProvider, NoopLoadBalancerProvider, ProviderError};

    const SYNC_PERIOD: Duration = Duration::from_secs(600);

    fn prober(result: ProbeResult) -> MockReadinessProber {
        let mut prober = MockReadinessProber::new();
        prober.expect_probe().returning(move |_| result.clone());
        prober
    }

    fn quiet_recorder() -> MockEventRecorder {
        let mut recorder = MockEventRecorder::new();
        recorder.expect_emit().return_const(());
        recorder
    }

    fn reconciler(
        store: Arc<FakeStore>,
        load_balancer: Arc<dyn LoadBalancerProvider>,
        prober: MockReadinessProber,
        recorder: MockEventRecorder,
    ) -> VirtualMachineServiceReconciler {
        VirtualMachineServiceReconciler {
            store,
            load_balancer,
            prober: Arc::new(prober),
            recorder: Arc::new(recorder),
            sync_period: SYNC_PERIOD,
        }
    }

    fn with_finalizer(mut svc: VirtualMachineService) -> VirtualMachineService {
        finalizer::add(&mut svc, FINALIZER);
        svc
    }

    fn addresses(store: &FakeStore, name: &str) -> Vec<String> {
        store
            .endpoints
            .get(NAMESPACE, name)
            .map(|e| {
                endpoints::subsets_of(&e)
                    .iter()
                    .flat_map(|s| s.addresses.clone().unwrap_or_default())
                    .map(|a| a.ip)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_creates_service_and_endpoints() {
        let store = Arc::new(FakeStore::new());
        store
            .vm_services
            .insert(testing::vm_service("db", VirtualMachineServiceType::ClusterIP, "db"));
        store.vms.insert(testing::running_vm("db-0", "db", "10.0.0.1"));
        store.vms.insert(testing::running_vm("db-1", "db", ""));
        store.vms.insert(testing::running_vm("web-0", "web", "10.0.0.9"));

        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_emit()
            .withf(|_, kind, reason, _| *kind == EventKind::Normal && reason == "CreateVMServiceSuccess")
            .times(1)
            .return_const(());
        let r = reconciler(
            store.clone(),
            Arc::new(NoopLoadBalancerProvider),
            prober(ProbeResult::Unknown),
            recorder,
        );

        let action = r.reconcile(NAMESPACE, "db").await.unwrap();
        assert_eq!(action, Action::requeue(SYNC_PERIOD));

        let svc = store.vm_services.get(NAMESPACE, "db").unwrap();
        assert!(finalizer::contains(&svc, FINALIZER));
        assert!(store.services.get(NAMESPACE, "db").is_some());
        assert_eq!(addresses(&store, "db"), vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_steady_state_writes_nothing() {
        let store = Arc::new(FakeStore::new());
        store.vm_services.insert(with_finalizer(testing::vm_service(
            "db",
            VirtualMachineServiceType::ClusterIP,
            "db",
        )));
        store.vms.insert(testing::running_vm("db-0", "db", "10.0.0.1"));
        let r = reconciler(
            store.clone(),
            Arc::new(NoopLoadBalancerProvider),
            prober(ProbeResult::Success),
            quiet_recorder(),
        );

        r.reconcile(NAMESPACE, "db").await.unwrap();
        store.clear_writes();
        r.reconcile(NAMESPACE, "db").await.unwrap();
        assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
    }

    #[tokio::test]
    async fn test_all_probes_failing_keeps_endpoints() {
        let store = Arc::new(FakeStore::new());
        let vm_service = with_finalizer(testing::vm_service("db", VirtualMachineServiceType::ClusterIP, "db"));
        store.vms.insert(testing::running_vm("db-0", "db", "10.0.0.1"));
        store.vms.insert(testing::running_vm("db-1", "db", "10.0.0.2"));
        store.services.insert(service::desired_service(&vm_service));
        store.endpoints.insert(endpoints::endpoints(
            &vm_service,
            None,
            vec![EndpointSubset {
                addresses: Some(vec![EndpointAddress {
                    ip: "10.0.0.1".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
        ));
        store.vm_services.insert(vm_service);

        let r = reconciler(
            store.clone(),
            Arc::new(NoopLoadBalancerProvider),
            prober(ProbeResult::Failure("connection refused".to_string())),
            quiet_recorder(),
        );

        let err = r.reconcile(NAMESPACE, "db").await.unwrap_err();
        assert_eq!(err.requeue_after(), Some(PROBE_FAILURE_REQUEUE_DELAY));
        assert_eq!(addresses(&store, "db"), vec!["10.0.0.1"]);
        assert!(!store.writes().iter().any(|w| w.contains("endpoints")));
    }

    #[tokio::test]
    async fn test_load_balancer_provisioned_and_ingress_recorded() {
        let store = Arc::new(FakeStore::new());
        let vm_service = with_finalizer(testing::vm_service("web", VirtualMachineServiceType::LoadBalancer, "web"));
        let mut native = service::desired_service(&vm_service);
        native.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![ServiceIngress {
                    ip: Some("192.168.100.4".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        store.services.insert(native);
        store.vm_services.insert(vm_service);
        store.vms.insert(testing::running_vm("web-0", "web", "10.0.0.1"));

        let mut lb = MockLoadBalancerProvider::new();
        lb.expect_network_name()
            .withf(|vms, _| vms.len() == 1)
            .returning(|_, _| Ok("vnet-dev".to_string()));
        lb.expect_ensure_load_balancer()
            .withf(|_, network| network == "vnet-dev")
            .times(1)
            .returning(|_, _| Ok(()));
        let r = reconciler(store.clone(), Arc::new(lb), prober(ProbeResult::Unknown), quiet_recorder());

        r.reconcile(NAMESPACE, "web").await.unwrap();
        let status = store.vm_services.get(NAMESPACE, "web").unwrap().status.unwrap();
        assert_eq!(status.load_balancer.ingress[0].ip, "192.168.100.4");
    }

    #[tokio::test]
    async fn test_load_balancer_failure_skips_service() {
        let store = Arc::new(FakeStore::new());
        store.vm_services.insert(with_finalizer(testing::vm_service(
            "web",
            VirtualMachineServiceType::LoadBalancer,
            "web",
        )));

        let mut lb = MockLoadBalancerProvider::new();
        lb.expect_network_name().returning(|_, _| Ok(String::new()));
        lb.expect_ensure_load_balancer()
            .returning(|_, _| Err(ProviderError::operation("ensure_load_balancer", "dev/web", "quota exceeded")));
        let r = reconciler(store.clone(), Arc::new(lb), prober(ProbeResult::Unknown), quiet_recorder());

        assert!(matches!(r.reconcile(NAMESPACE, "web").await, Err(Error::Provider(_))));
        assert_eq!(store.services.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_finalizer() {
        let store = Arc::new(FakeStore::new());
        store.vm_services.insert(testing::deleting(with_finalizer(testing::vm_service(
            "db",
            VirtualMachineServiceType::ClusterIP,
            "db",
        ))));

        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_emit()
            .withf(|_, _, reason, _| reason == "DeleteVMServiceSuccess")
            .times(1)
            .return_const(());
        let r = reconciler(
            store.clone(),
            Arc::new(NoopLoadBalancerProvider),
            prober(ProbeResult::Unknown),
            recorder,
        );

        assert_eq!(r.reconcile(NAMESPACE, "db").await.unwrap(), Action::await_change());
        assert!(store.vm_services.get(NAMESPACE, "db").is_none());
    }
}
