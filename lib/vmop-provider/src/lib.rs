//! Provider capabilities consumed by the vm-operator controllers
//!
//! The reconcilers never talk to a virtualization platform directly. They hand a fully
//! resolved [`VmConfigArgs`] bundle to a [`VirtualMachineProvider`], and load-balancer
//! type services go through a [`LoadBalancerProvider`].

pub mod config_args;
pub mod error;
pub mod load_balancer;
pub mod provider;
pub mod simulator;

pub use config_args::{VmConfigArgs, VmMetadata};
pub use error::{ProviderError, Result};
pub use load_balancer::{LoadBalancerProvider, NoopLoadBalancerProvider};
pub use provider::VirtualMachineProvider;
pub use simulator::{Operation, SimulatorProvider};

#[cfg(any(test, feature = "mock"))]
pub use load_balancer::MockLoadBalancerProvider;
#[cfg(any(test, feature = "mock"))]
pub use provider::MockVirtualMachineProvider;
