use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vmop_core::config::{
    DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_MAX_CREATE_VMS_ON_PROVIDER, DEFAULT_PROBE_PERIOD, DEFAULT_SYNC_PERIOD,
};
use vmop_core::probe::TcpProber;
use vmop_core::{Backoff, CreateAdmission, FeatureGates, KubeEventRecorder, ManagerConfig, ProbeRegistry};
use vmop_provider::{NoopLoadBalancerProvider, SimulatorProvider, VirtualMachineProvider};

mod controller;
mod finalizer;
mod metrics;
mod server;
mod store;
#[cfg(test)]
mod testing;
mod virtualmachine;
mod virtualmachineservice;

use metrics::Metrics;
use server::Health;
use store::KubeStore;
use virtualmachine::VirtualMachineReconciler;
use virtualmachineservice::VirtualMachineServiceReconciler;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// In-memory provider for development clusters and demos
    Simulator,
}

/// Kubernetes controller manager reconciling VirtualMachines against a virtualization provider
#[derive(Debug, Parser)]
#[command(name = "vm-operator", version)]
struct Cli {
    /// Print every CustomResourceDefinition as YAML and exit
    #[arg(long)]
    crd: bool,

    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILES)]
    max_concurrent_reconciles: usize,

    /// Percentage of the concurrent reconciles allowed to create VMs at once
    #[arg(long, env = "MAX_CREATE_VMS_ON_PROVIDER", default_value_t = DEFAULT_MAX_CREATE_VMS_ON_PROVIDER)]
    max_create_vms_on_provider: u32,

    /// Resync period in seconds
    #[arg(long, env = "SYNC_PERIOD_SECONDS", default_value_t = DEFAULT_SYNC_PERIOD.as_secs())]
    sync_period: u64,

    /// Enforce class and content source bindings
    #[arg(long, env = "FSS_WCP_VMSERVICE")]
    vm_service_fss: bool,

    /// Generate instance storage volumes and wait for their placement
    #[arg(long, env = "FSS_WCP_INSTANCE_STORAGE")]
    instance_storage_fss: bool,

    /// Namespace to watch; all namespaces when empty
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    watch_namespace: String,

    #[arg(long, default_value = "0.0.0.0:8083")]
    metrics_addr: SocketAddr,

    #[arg(long, default_value = "0.0.0.0:9445")]
    health_addr: SocketAddr,

    #[arg(long, env = "POD_NAMESPACE", default_value = "vmware-system-vmop")]
    pod_namespace: String,

    #[arg(long, default_value = "vmoperator-controller-manager")]
    manager_name: String,

    /// Readiness probe period in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_PERIOD.as_secs())]
    probe_period: u64,

    #[arg(long, value_enum, default_value_t = ProviderKind::Simulator)]
    provider: ProviderKind,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            max_create_vms_on_provider: self.max_create_vms_on_provider,
            sync_period: Duration::from_secs(self.sync_period),
            features: FeatureGates {
                vm_service: self.vm_service_fss,
                instance_storage: self.instance_storage_fss,
            },
            watch_namespace: (!self.watch_namespace.is_empty()).then(|| self.watch_namespace.clone()),
            pod_namespace: self.pod_namespace.clone(),
            manager_name: self.manager_name.clone(),
            probe_period: Duration::from_secs(self.probe_period),
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

fn print_crds() -> Result<()> {
    for crd in vmop_api::v1alpha1::crds() {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}

fn spawn_server(name: &'static str, addr: SocketAddr, metrics: Arc<Metrics>, health: Arc<Health>) {
    tokio::spawn(async move {
        if let Err(e) = server::serve(addr, metrics, health).await {
            error!(server = name, addr = %addr, error = %e, "HTTP server stopped");
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.crd {
        return print_crds();
    }
    init_logging(cli.log_format);

    let config = cli.manager_config();
    config.validate()?;
    info!(
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        max_create_vms_on_provider = config.max_create_vms_on_provider,
        sync_period = ?config.sync_period,
        vm_service_fss = config.features.vm_service,
        instance_storage_fss = config.features.instance_storage,
        "Starting vm-operator"
    );

    let client = Client::try_default().await?;
    let metrics = Arc::new(Metrics::new()?);
    let health = Arc::new(Health::default());
    let store = Arc::new(KubeStore::new(client.clone()));

    let provider: Arc<dyn VirtualMachineProvider> = match cli.provider {
        ProviderKind::Simulator => Arc::new(SimulatorProvider::new()),
    };
    let admission = Arc::new(CreateAdmission::from_concurrency(
        config.max_concurrent_reconciles,
        config.max_create_vms_on_provider,
    ));
    info!(bound = admission.bound(), "Configured create admission");

    let probes = Arc::new(ProbeRegistry::new());
    tokio::spawn(probes.clone().run(config.probe_period));

    let vm_ctx = Arc::new(virtualmachine::Context {
        reconciler: VirtualMachineReconciler {
            store: store.clone(),
            provider,
            recorder: Arc::new(KubeEventRecorder::new(
                client.clone(),
                virtualmachine::IDENTITY.reporter_name(&config),
            )),
            prober: probes,
            admission,
            features: config.features,
            sync_period: config.sync_period,
            metrics: metrics.clone(),
        },
        metrics: metrics.clone(),
        backoff: Backoff::default(),
    });

    let vm_service_ctx = Arc::new(virtualmachineservice::Context {
        reconciler: VirtualMachineServiceReconciler {
            store,
            load_balancer: Arc::new(NoopLoadBalancerProvider),
            prober: Arc::new(TcpProber),
            recorder: Arc::new(KubeEventRecorder::new(
                client.clone(),
                virtualmachineservice::IDENTITY.reporter_name(&config),
            )),
            sync_period: config.sync_period,
        },
        metrics: metrics.clone(),
        backoff: Backoff::default(),
    });

    spawn_server("metrics", cli.metrics_addr, metrics.clone(), health.clone());
    spawn_server("health", cli.health_addr, metrics, health.clone());
    health.set_ready(true);

    tokio::join!(
        virtualmachine::run(client.clone(), &config, vm_ctx),
        virtualmachineservice::run(client, &config, vm_service_ctx),
    );

    info!("Shutdown signal received, exiting...");
    Ok(())
}
