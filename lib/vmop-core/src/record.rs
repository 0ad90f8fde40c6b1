//! Kubernetes Event recording
//!
//! Publishing is fire-and-forget: a failed event is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl From<EventKind> for EventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        }
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn emit(&self, reference: &ObjectReference, kind: EventKind, reason: &str, message: &str);
}

/// Emit `<op>Success` as a Normal event, or `<op>Failure` as a Warning carrying the error
pub async fn emit_outcome<E: std::fmt::Display + ?Sized>(
    recorder: &dyn EventRecorder,
    reference: &ObjectReference,
    op: &str,
    outcome: std::result::Result<(), &E>,
) {
    match outcome {
        Ok(()) => {
            let reason = format!("{}Success", op);
            recorder.emit(reference, EventKind::Normal, &reason, "").await;
        }
        Err(e) => {
            let reason = format!("{}Failure", op);
            recorder.emit(reference, EventKind::Warning, &reason, &e.to_string()).await;
        }
    }
}

/// Recorder publishing through the events.k8s.io API
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// `reporter` becomes the reportingController of every event
    pub fn new(client: Client, reporter: String) -> Self {
        let reporter = Reporter {
            controller: reporter,
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn emit(&self, reference: &ObjectReference, kind: EventKind, reason: &str, message: &str) {
        let event = Event {
            type_: kind.into(),
            reason: reason.to_string(),
            note: (!message.is_empty()).then(|| message.to_string()),
            action: reason.to_string(),
            secondary: None,
        };
        match self.recorder.publish(&event, reference).await {
            Ok(()) => debug!(reason, "Published event"),
            Err(e) => warn!(reason, error = %e, "Failed to publish Kubernetes event"),
        }
    }
}
