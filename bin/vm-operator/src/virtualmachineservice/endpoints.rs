//! Endpoint subsets recomputed from the VirtualMachines a service selects

use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use tracing::{debug, info};
use vmop_api::{VirtualMachine, VirtualMachineService};
use vmop_core::probe::{ProbeResult, ReadinessProber};

use super::service::object_meta;

/// Subsets computed for one reconcile
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Computed {
    pub subsets: Vec<EndpointSubset>,
    /// Number of VMs the service selects
    pub selected: usize,
    pub probe_failures: usize,
}

impl Computed {
    pub fn all_probes_failed(&self) -> bool {
        self.probe_failures > 0 && self.probe_failures == self.selected
    }
}

/// One subset per (ready VM, service port) pair whose target port the VM resolves
///
/// VMs being deleted, without an IP or host, or failing their readiness probe are skipped.
pub async fn compute(
    service: &Service,
    vms: &[VirtualMachine],
    prober: &dyn ReadinessProber,
) -> Computed {
    let service_ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or(&[]);
    let mut computed = Computed {
        selected: vms.len(),
        ..Default::default()
    };

    for vm in vms {
        let key = vm.namespaced_name();
        if vm.is_deleting() {
            info!(vm = %key, "Skipping VM marked for deletion");
            continue;
        }
        if vm.vm_ip().is_empty() {
            info!(vm = %key, "Skipping VM without an IP");
            continue;
        }
        if vm.host().is_empty() {
            info!(vm = %key, "Skipping VM without a host");
            continue;
        }
        if let ProbeResult::Failure(reason) = prober.probe(vm).await {
            info!(vm = %key, reason = %reason, "Skipping VM failing its readiness probe");
            computed.probe_failures += 1;
            continue;
        }

        let address = endpoint_address(vm);
        for port in service_ports {
            let protocol = port.protocol.clone().unwrap_or_else(|| "TCP".to_string());
            let Some(target) = port.target_port.as_ref() else {
                continue;
            };
            let Some(number) = find_port(vm, target, &protocol) else {
                debug!(vm = %key, port = ?port.name, "VM does not expose service target port");
                continue;
            };
            computed.subsets.push(EndpointSubset {
                addresses: Some(vec![address.clone()]),
                ports: Some(vec![EndpointPort {
                    name: port.name.clone(),
                    port: number,
                    protocol: Some(protocol),
                    ..Default::default()
                }]),
                ..Default::default()
            });
        }
    }
    computed
}

/// Endpoints object carrying `subsets`, keeping the resourceVersion of `current`
pub fn endpoints(vm_service: &VirtualMachineService, current: Option<&Endpoints>, subsets: Vec<EndpointSubset>) -> Endpoints {
    let mut metadata = object_meta(vm_service);
    metadata.resource_version = current.and_then(|e| e.metadata.resource_version.clone());
    Endpoints {
        metadata,
        subsets: (!subsets.is_empty()).then_some(subsets),
    }
}

pub fn subsets_of(endpoints: &Endpoints) -> &[EndpointSubset] {
    endpoints.subsets.as_deref().unwrap_or(&[])
}

/// Address of `vm`, with targetRef naming the backing VirtualMachine rather than the VirtualMachineService
fn endpoint_address(vm: &VirtualMachine) -> EndpointAddress {
    let mut target = vm.object_ref(&());
    target.resource_version = None;
    EndpointAddress {
        ip: vm.vm_ip().to_string(),
        target_ref: Some(target),
        ..Default::default()
    }
}

/// Port number of `target` on the VM; named ports are looked up in spec.ports by protocol
fn find_port(vm: &VirtualMachine, target: &IntOrString, protocol: &str) -> Option<i32> {
    match target {
        IntOrString::Int(n) => Some(*n),
        IntOrString::String(name) => vm
            .spec
            .ports
            .iter()
            .find(|p| &p.name == name && p.protocol.eq_ignore_ascii_case(protocol))
            .map(|p| p.port),
    }
}
