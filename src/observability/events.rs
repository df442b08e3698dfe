use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::error::AppError;
use crate::models::event::LifecycleEvent;
use crate::observability::metrics::Metrics;

/// Shared sink for committed transitions and failed operations.
#[derive(Clone)]
pub struct Telemetry {
    pub metrics: Metrics,
    events_tx: broadcast::Sender<LifecycleEvent>,
}

impl Telemetry {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self {
            metrics: Metrics::new(),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    pub fn publish(&self, event: LifecycleEvent) {
        self.metrics
            .lifecycle_transitions_total
            .with_label_values(&[event.entity.as_str(), event.status])
            .inc();
        let _ = self.events_tx.send(event);
    }

    /// Counts a failed operation and hands the error back for propagation.
    pub fn failed(&self, operation: &'static str, err: AppError) -> AppError {
        self.metrics
            .operation_failures_total
            .with_label_values(&[operation, err.kind()])
            .inc();

        match &err {
            AppError::Inconsistent(_) | AppError::Internal(_) => {
                error!(operation, error = %err, "lifecycle operation failed");
            }
            AppError::Conflict(_) => {
                warn!(operation, error = %err, "lifecycle operation lost a race");
            }
            _ => {}
        }

        err
    }
}
