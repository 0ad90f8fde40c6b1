//! Reconciliation building blocks shared by the vm-operator controllers

pub mod admission;
pub mod backoff;
pub mod conditions;
pub mod config;
pub mod error;
pub mod patch;
pub mod probe;
pub mod prober;
pub mod record;

pub use admission::{CreateAdmission, CreatePermit};
pub use backoff::Backoff;
pub use config::{ControllerIdentity, FeatureGates, ManagerConfig};
pub use error::{Error, Result};
pub use patch::PatchHelper;
pub use prober::{ProbeRegistry, ProberManager};
pub use record::{EventKind, EventRecorder, KubeEventRecorder};
