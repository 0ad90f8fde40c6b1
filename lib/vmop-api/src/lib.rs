//! VM Operator API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources reconciled by the vm-operator:
//! - VirtualMachine: a desired virtual machine on the infrastructure provider
//! - VirtualMachineClass / VirtualMachineClassBinding: hardware templates and their namespace grants
//! - VirtualMachineImage, ContentLibraryProvider, ContentSource, ContentSourceBinding: image provenance
//! - VirtualMachineSetResourcePolicy: resource pool and folder grouping
//! - VirtualMachineService: a service fronting a set of VirtualMachines

pub mod v1alpha1;

pub use v1alpha1::{
    Condition, ConditionSeverity, ConditionStatus, Conditioned, ContentLibraryProvider,
    ContentSource, ContentSourceBinding, VirtualMachine, VirtualMachineClass,
    VirtualMachineClassBinding, VirtualMachineImage, VirtualMachinePhase,
    VirtualMachinePowerState, VirtualMachineService, VirtualMachineServiceType,
    VirtualMachineSetResourcePolicy,
};
