//! Translation of a VirtualMachineService into its native Service

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use vmop_api::v1alpha1::virtualmachine_service::LoadBalancerIngress;
use vmop_api::{VirtualMachineService, VirtualMachineServiceType};

/// Metadata shared by the Service and Endpoints of a VirtualMachineService
///
/// Same name, namespace, labels and annotations, controller-owned by the VirtualMachineService.
pub fn object_meta(vm_service: &VirtualMachineService) -> ObjectMeta {
    ObjectMeta {
        name: vm_service.metadata.name.clone(),
        namespace: vm_service.metadata.namespace.clone(),
        labels: vm_service.metadata.labels.clone(),
        annotations: vm_service.metadata.annotations.clone(),
        owner_references: vm_service.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// The Service a VirtualMachineService translates to
///
/// No selector is set: endpoints are managed by the VirtualMachineService controller.
pub fn desired_service(vm_service: &VirtualMachineService) -> Service {
    let spec = &vm_service.spec;
    let ports = spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(p.name.clone()),
            protocol: Some(p.protocol.clone()),
            port: p.port,
            target_port: Some(IntOrString::Int(p.target_port)),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: object_meta(vm_service),
        spec: Some(ServiceSpec {
            type_: Some(spec.type_.as_str().to_string()),
            ports: Some(ports),
            external_name: non_empty(&spec.external_name),
            cluster_ip: non_empty(&spec.cluster_ip),
            ..Default::default()
        }),
        status: None,
    }
}

/// `current` with the translated fields of `desired` applied, or `None` when nothing changed
///
/// Node ports already allocated to a port number are kept.
pub fn updated_service(current: &Service, desired: &Service) -> Option<Service> {
    let mut next = current.clone();
    next.metadata.labels = desired.metadata.labels.clone();
    if next.metadata.owner_references.is_none() {
        next.metadata.owner_references = desired.metadata.owner_references.clone();
    }

    let desired_spec = desired.spec.clone().unwrap_or_default();
    let current_spec = current.spec.as_ref();
    let node_ports: HashMap<i32, i32> = current_spec
        .and_then(|s| s.ports.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|p| p.node_port.map(|node_port| (p.port, node_port)))
        .collect();

    let mut ports = desired_spec.ports.unwrap_or_default();
    for port in &mut ports {
        if let Some(node_port) = node_ports.get(&port.port) {
            port.node_port = Some(*node_port);
        }
    }

    let spec = next.spec.get_or_insert_with(Default::default);
    spec.type_ = desired_spec.type_;
    spec.external_name = desired_spec.external_name;
    spec.ports = Some(ports);

    (&next != current).then_some(next)
}

/// Ingress of a LoadBalancer Service as recorded in VirtualMachineService status
pub fn load_balancer_ingress(service: &Service) -> Vec<LoadBalancerIngress> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .map(|ingress| LoadBalancerIngress {
            ip: ingress.ip.clone().unwrap_or_default(),
            hostname: ingress.hostname.clone().unwrap_or_default(),
        })
        .collect()
}

pub fn is_load_balancer(vm_service: &VirtualMachineService) -> bool {
    vm_service.spec.type_ == VirtualMachineServiceType::LoadBalancer
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
