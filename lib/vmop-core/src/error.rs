use std::time::Duration;

use thiserror::Error;
use vmop_provider::ProviderError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Namespace {namespace} does not have access to {kind} {name}")]
    BindingNotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[error("VM metadata references both a ConfigMap and a Secret")]
    MetadataConflict,

    #[error("{kind} {name} has no {owner_kind} owner")]
    MissingOwner {
        kind: &'static str,
        name: String,
        owner_kind: &'static str,
    },

    #[error("Resource policy {0} is not ready")]
    ResourcePolicyNotReady(String),

    #[error("Resource policy {0} is being deleted")]
    ResourcePolicyDeleting(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Probe error: {0}")]
    Probe(String),

    /// Not a failure: reconcile again after the given delay without backoff
    #[error("Requeue after {0:?}")]
    RequeueAfter(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn binding_not_found(kind: &'static str, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::BindingNotFound {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn missing_owner(kind: &'static str, name: impl Into<String>, owner_kind: &'static str) -> Self {
        Self::MissingOwner {
            kind,
            name: name.into(),
            owner_kind,
        }
    }

    /// Whether the error reports an absent object, from the API server or the provider
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            Self::Provider(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Whether the error is a stale write rejected by optimistic concurrency
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Delay carried by [`Error::RequeueAfter`]
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::RequeueAfter(d) => Some(*d),
            _ => None,
        }
    }
}

/// Build the API error a store returns for a missing object
pub fn api_not_found(kind: &str, name: &str) -> kube::Error {
    api_error(404, "NotFound", format!("{} \"{}\" not found", kind, name))
}

/// Build the API error a store returns for a stale resourceVersion
pub fn api_conflict(kind: &str, name: &str) -> kube::Error {
    api_error(
        409,
        "Conflict",
        format!(
            "Operation cannot be fulfilled on {} \"{}\": the object has been modified",
            kind, name
        ),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}
