//! Prometheus metrics for the controllers

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics shared by every controller in the manager
pub struct Metrics {
    /// Reconciles by controller and result
    pub reconcile_total: IntCounterVec,
    /// Reconcile latency in seconds by controller
    pub reconcile_duration_seconds: HistogramVec,
    /// Provider creates currently holding an admission slot
    pub vm_creates_in_flight: IntGauge,
    /// Creates deferred because no admission slot was free
    pub vm_create_deferred_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconcile_total = IntCounterVec::new(
            Opts::new("vmop_reconcile_total", "Total reconciles by controller and result"),
            &["controller", "result"],
        )?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new("vmop_reconcile_duration_seconds", "Reconcile latency in seconds")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
            &["controller"],
        )?;

        let vm_creates_in_flight = IntGauge::new(
            "vmop_vm_creates_in_flight",
            "VirtualMachine creates in flight on the provider",
        )?;

        let vm_create_deferred_total = IntCounter::new(
            "vmop_vm_create_deferred_total",
            "VirtualMachine creates deferred for lack of a create slot",
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;
        registry.register(Box::new(vm_creates_in_flight.clone()))?;
        registry.register(Box::new(vm_create_deferred_total.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_duration_seconds,
            vm_creates_in_flight,
            vm_create_deferred_total,
            registry,
        })
    }

    /// Record the outcome of one reconcile
    pub fn observe_reconcile(&self, controller: &str, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "error" };
        self.reconcile_total.with_label_values(&[controller, result]).inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
