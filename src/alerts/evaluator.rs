//! Threshold evaluation with fire-once semantics

use std::sync::Arc;

use serde::Serialize;

use crate::error::WarnMetricError;
use crate::metrics::{MetricRegistry, Observation, StoreStatus, WarnMetric, WarnMetricStatus};
use crate::storage::{StatusStore, Transition};

/// Result of evaluating one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    NoAction,
    /// Threshold crossed; the caller must dispatch a notification
    Fire,
    /// Run-once metric already notified; the caller must not resend
    AlreadyFired,
}

/// Full evaluation result, including what the store held before and after
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    /// Status before this evaluation
    pub previous: WarnMetricStatus,
    /// Status after this evaluation
    pub current: WarnMetricStatus,
}

impl Evaluation {
    /// Whether this evaluation wrote a new status
    pub fn wrote(&self) -> bool {
        self.previous != self.current
    }
}

pub struct ThresholdEvaluator {
    registry: Arc<MetricRegistry>,
    store: StatusStore,
}

impl ThresholdEvaluator {
    pub fn new(registry: Arc<MetricRegistry>, store: StatusStore) -> Self {
        Self { registry, store }
    }

    pub fn evaluate(
        &self,
        id: &str,
        observed: impl Into<Observation>,
    ) -> Result<Decision, WarnMetricError> {
        self.evaluate_detailed(id, observed.into())
            .map(|evaluation| evaluation.decision)
    }

    /// Evaluate and persist the fire transition before returning `Fire`.
    ///
    /// Concurrent callers race through the store's compare-and-set, so
    /// only one of them moves a run-once metric into its fired status.
    pub fn evaluate_detailed(
        &self,
        id: &str,
        observed: Observation,
    ) -> Result<Evaluation, WarnMetricError> {
        let metric = self
            .registry
            .lookup(id)
            .ok_or_else(|| WarnMetricError::UnknownMetric(id.to_string()))?;

        let triggered = crosses(metric, observed)?;

        let evaluation = self.store.update(metric, |status| {
            let keep = |decision| {
                Transition::Keep(Evaluation {
                    decision,
                    previous: status.clone(),
                    current: status.clone(),
                })
            };

            if status.acked || status.store_status == StoreStatus::Ack {
                return keep(Decision::NoAction);
            }
            if metric.is_run_once && status.store_status.has_fired() {
                return keep(Decision::AlreadyFired);
            }
            if !triggered {
                return keep(Decision::NoAction);
            }

            let target = fired_status(metric);
            if status.store_status == target {
                // Repeatable metric that is still waiting for an ack
                return keep(Decision::Fire);
            }

            let next = WarnMetricStatus {
                id: metric.id.clone(),
                limit: metric.limit,
                acked: false,
                store_status: target,
            };
            Transition::Write(
                next.clone(),
                Evaluation {
                    decision: Decision::Fire,
                    previous: status.clone(),
                    current: next,
                },
            )
        })?;

        match evaluation.decision {
            Decision::Fire => tracing::info!(
                metric_id = %metric.id,
                observed = %observed,
                limit = metric.limit,
                status = %evaluation.current.store_status,
                "Warn metric fired"
            ),
            decision => tracing::debug!(
                metric_id = %metric.id,
                observed = %observed,
                ?decision,
                "Warn metric evaluated"
            ),
        }

        Ok(evaluation)
    }
}

/// Status written when a metric fires
pub fn fired_status(metric: &WarnMetric) -> StoreStatus {
    if metric.is_run_once && metric.is_bot_only {
        StoreStatus::RunOnce
    } else {
        StoreStatus::LimitReached
    }
}

/// Reject an observation whose kind does not fit the metric
pub fn check_observation(metric: &WarnMetric, observed: Observation) -> Result<(), WarnMetricError> {
    crosses(metric, observed).map(|_| ())
}

/// Whether an observation meets the metric's threshold
fn crosses(metric: &WarnMetric, observed: Observation) -> Result<bool, WarnMetricError> {
    match (metric.is_qualitative(), observed) {
        (true, Observation::Condition(asserted)) => Ok(asserted),
        (_, Observation::Count(value)) => Ok(value >= metric.limit),
        (false, Observation::Condition(_)) => Err(WarnMetricError::InvalidObservation {
            id: metric.id.clone(),
            reason: format!("expected a count to compare against limit {}", metric.limit),
        }),
    }
}
