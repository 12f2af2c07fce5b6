//! Acknowledgment of fired warn metrics

use std::sync::Arc;

use crate::error::WarnMetricError;
use crate::metrics::{MetricRegistry, StoreStatus, WarnMetricStatus};
use crate::storage::{StatusStore, Transition};

/// Result of an acknowledgment
#[derive(Debug, Clone)]
pub struct AckOutcome {
    pub status: WarnMetricStatus,
    /// False when the metric was already acknowledged
    pub newly_acked: bool,
    /// Status before the acknowledgment
    pub previous: StoreStatus,
}

pub struct AckHandler {
    registry: Arc<MetricRegistry>,
    store: StatusStore,
}

impl AckHandler {
    pub fn new(registry: Arc<MetricRegistry>, store: StatusStore) -> Self {
        Self { registry, store }
    }

    pub fn acknowledge(
        &self,
        id: &str,
        force_ack: bool,
    ) -> Result<WarnMetricStatus, WarnMetricError> {
        self.acknowledge_detailed(id, force_ack)
            .map(|outcome| outcome.status)
    }

    /// Mark a metric acknowledged so it never notifies again.
    ///
    /// Without `force_ack` the metric must have fired, unless it is a
    /// skip-action metric which has nothing to confirm.
    pub fn acknowledge_detailed(
        &self,
        id: &str,
        force_ack: bool,
    ) -> Result<AckOutcome, WarnMetricError> {
        let metric = self
            .registry
            .lookup(id)
            .ok_or_else(|| WarnMetricError::UnknownMetric(id.to_string()))?;

        let outcome = self.store.update(metric, |status| {
            if status.acked {
                return Transition::Keep(Ok(AckOutcome {
                    status: status.clone(),
                    newly_acked: false,
                    previous: status.store_status,
                }));
            }

            if !force_ack && status.store_status.is_unset() && !metric.skip_action {
                return Transition::Keep(Err(WarnMetricError::NotFired(metric.id.clone())));
            }

            let next = WarnMetricStatus {
                id: metric.id.clone(),
                limit: metric.limit,
                acked: true,
                store_status: StoreStatus::Ack,
            };
            Transition::Write(
                next.clone(),
                Ok(AckOutcome {
                    status: next,
                    newly_acked: true,
                    previous: status.store_status,
                }),
            )
        })??;

        if outcome.newly_acked {
            tracing::info!(
                metric_id = %metric.id,
                force_ack,
                previous = %outcome.previous,
                "Warn metric acknowledged"
            );
        }

        Ok(outcome)
    }
}
