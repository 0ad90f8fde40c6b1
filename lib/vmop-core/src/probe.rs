//! TCP readiness probing of VirtualMachines

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;
use vmop_api::VirtualMachine;

use crate::{Error, Result};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    Success,
    Failure(String),
    /// The VM defines no readiness probe
    Unknown,
}

impl ProbeResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Resolved endpoint of a TCP probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

/// Evaluates a VM's readiness probe
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ReadinessProber: Send + Sync {
    async fn probe(&self, vm: &VirtualMachine) -> ProbeResult;
}

/// Dials the probe's TCP socket with a connect timeout
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProber;

#[async_trait]
impl ReadinessProber for TcpProber {
    async fn probe(&self, vm: &VirtualMachine) -> ProbeResult {
        let target = match probe_target(vm) {
            Ok(Some(target)) => target,
            Ok(None) => return ProbeResult::Unknown,
            Err(e) => return ProbeResult::Failure(e.to_string()),
        };
        match probe_tcp(&target).await {
            Ok(()) => ProbeResult::Success,
            Err(e) => ProbeResult::Failure(e.to_string()),
        }
    }
}

/// Target of the VM's TCP probe, `None` when it has none
pub fn probe_target(vm: &VirtualMachine) -> Result<Option<ProbeTarget>> {
    let Some(probe) = vm.spec.readiness_probe.as_ref() else {
        return Ok(None);
    };
    let Some(tcp) = probe.tcp_socket.as_ref() else {
        return Err(Error::Probe(format!(
            "unknown action specified for probe in VM {}",
            vm.namespaced_name()
        )));
    };

    let port = resolve_port(vm, &tcp.port)?;
    let host = if tcp.host.is_empty() {
        vm.vm_ip().to_string()
    } else {
        tcp.host.clone()
    };
    if host.is_empty() {
        return Err(Error::Probe(format!("VM {} has no IP to probe", vm.namespaced_name())));
    }
    let timeout = if probe.timeout_seconds > 0 {
        Duration::from_secs(probe.timeout_seconds as u64)
    } else {
        DEFAULT_PROBE_TIMEOUT
    };

    Ok(Some(ProbeTarget { host, port, timeout }))
}

/// Port number, or the TCP port named in the VM's spec.ports
pub fn resolve_port(vm: &VirtualMachine, port: &IntOrString) -> Result<u16> {
    let number = match port {
        IntOrString::Int(n) => *n,
        IntOrString::String(name) => match name.parse::<i32>() {
            Ok(n) => n,
            Err(_) => vm
                .spec
                .ports
                .iter()
                .find(|p| &p.name == name && p.protocol.eq_ignore_ascii_case("TCP"))
                .map(|p| p.port)
                .ok_or_else(|| Error::Probe(format!("port {} not found in VM ports", name)))?,
        },
    };
    u16::try_from(number)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::Probe(format!("invalid port number {}", number)))
}

pub async fn probe_tcp(target: &ProbeTarget) -> Result<()> {
    let addr = format!("{}:{}", target.host, target.port);
    match time::timeout(target.timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => {
            debug!(addr = %addr, "TCP probe succeeded");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::Probe(format!("dial {}: {}", addr, e))),
        Err(_) => Err(Error::Probe(format!("dial {}: timed out after {:?}", addr, target.timeout))),
    }
}
