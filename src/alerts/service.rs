//! Warn metric service: evaluation, dispatch and acknowledgment together

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::ack::AckHandler;
use super::config::{AlertsConfig, DispatchFailurePolicy};
use super::evaluator::{check_observation, Decision, Evaluation, ThresholdEvaluator};
use super::notifier::{
    DispatchContext, DispatchOutcome, NotificationDispatcher, NotificationTransport,
};
use crate::error::WarnMetricError;
use crate::metrics::{MetricRegistry, Observation, WarnMetric, WarnMetricStatus};
use crate::storage::{KvStore, StatusStore};

/// Outcome of evaluating (and possibly notifying) one metric
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub metric_id: String,
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<DispatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct WarnMetricService {
    registry: Arc<MetricRegistry>,
    store: StatusStore,
    evaluator: ThresholdEvaluator,
    acks: AckHandler,
    dispatcher: NotificationDispatcher,
    failure_policy: DispatchFailurePolicy,
}

impl WarnMetricService {
    pub fn new(
        registry: Arc<MetricRegistry>,
        kv: Arc<dyn KvStore>,
        transport: Arc<dyn NotificationTransport>,
        config: &AlertsConfig,
    ) -> Self {
        let store = StatusStore::new(kv);
        Self {
            evaluator: ThresholdEvaluator::new(Arc::clone(&registry), store.clone()),
            acks: AckHandler::new(Arc::clone(&registry), store.clone()),
            dispatcher: NotificationDispatcher::new(
                Arc::clone(&registry),
                transport,
                config.notifications.clone(),
            ),
            registry,
            store,
            failure_policy: config.failure_policy,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Check that an observation names a known metric and has the right kind
    pub fn validate(&self, id: &str, observed: Observation) -> Result<(), WarnMetricError> {
        let metric = self
            .registry
            .lookup(id)
            .ok_or_else(|| WarnMetricError::UnknownMetric(id.to_string()))?;
        check_observation(metric, observed)
    }

    /// Evaluate without notifying
    pub fn evaluate(
        &self,
        id: &str,
        observed: impl Into<Observation>,
    ) -> Result<Decision, WarnMetricError> {
        self.evaluator.evaluate(id, observed)
    }

    /// Evaluate one metric and send its notification when it fires
    pub async fn evaluate_and_notify(
        &self,
        id: &str,
        observed: Observation,
    ) -> Result<CheckReport, WarnMetricError> {
        let evaluation = self.evaluator.evaluate_detailed(id, observed)?;

        let mut report = CheckReport {
            metric_id: id.to_string(),
            decision: Some(evaluation.decision),
            dispatched: None,
            error: None,
        };
        if evaluation.decision != Decision::Fire {
            return Ok(report);
        }

        let metric = self
            .registry
            .lookup(id)
            .ok_or_else(|| WarnMetricError::UnknownMetric(id.to_string()))?;

        let context = DispatchContext {
            observed: Some(observed),
            recipient: self.stored_recipient(metric),
        };

        match self.dispatcher.dispatch(metric, &context).await {
            Ok(outcome) => {
                report.dispatched = Some(outcome);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(metric_id = %id, error = %e, "Failed to send warn metric notification");
                self.handle_dispatch_failure(metric, &evaluation);
                Err(e)
            }
        }
    }

    /// Acknowledge a metric, sending the follow-up message for a normal ack
    pub async fn acknowledge(
        &self,
        id: &str,
        force_ack: bool,
    ) -> Result<WarnMetricStatus, WarnMetricError> {
        let outcome = self.acks.acknowledge_detailed(id, force_ack)?;

        if outcome.newly_acked && !force_ack && outcome.previous.has_fired() {
            if let Some(metric) = self.registry.lookup(id) {
                // The ack is already stored; a lost follow-up is only logged
                if let Err(e) = self.dispatcher.dispatch_ack_success(metric).await {
                    tracing::warn!(metric_id = %id, error = %e, "Failed to send acknowledgment message");
                }
            }
        }

        Ok(outcome.status)
    }

    /// Evaluate every registered metric that has an observation
    pub async fn run_checks(&self, observations: &HashMap<String, Observation>) -> Vec<CheckReport> {
        let checks = self.registry.iter().filter_map(|metric| {
            observations
                .get(&metric.id)
                .map(|observed| self.check_one(&metric.id, *observed))
        });
        let reports = futures::future::join_all(checks).await;

        for id in observations.keys().filter(|id| !self.registry.contains(id)) {
            tracing::warn!(metric_id = %id, "Ignoring observation for unknown warn metric");
        }

        let fired = reports
            .iter()
            .filter(|r| r.decision == Some(Decision::Fire))
            .count();
        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        tracing::info!(
            checked = reports.len(),
            fired,
            failed,
            "Warn metric check cycle complete"
        );

        reports
    }

    /// Stored status for one metric (unset if never written)
    pub fn status(&self, id: &str) -> Result<WarnMetricStatus, WarnMetricError> {
        let metric = self
            .registry
            .lookup(id)
            .ok_or_else(|| WarnMetricError::UnknownMetric(id.to_string()))?;
        Ok(self.store.load(metric)?.status)
    }

    /// Fired metrics still waiting for an acknowledgment
    pub fn pending_statuses(&self) -> Result<HashMap<String, WarnMetricStatus>, WarnMetricError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|status| self.registry.contains(&status.id) && status.is_pending())
            .map(|status| (status.id.clone(), status))
            .collect())
    }

    async fn check_one(&self, id: &str, observed: Observation) -> CheckReport {
        match self.evaluate_and_notify(id, observed).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(metric_id = %id, error = %e, "Warn metric check failed");
                CheckReport {
                    metric_id: id.to_string(),
                    decision: match e {
                        WarnMetricError::DispatchFailed(_) => Some(Decision::Fire),
                        _ => None,
                    },
                    dispatched: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn stored_recipient(&self, metric: &WarnMetric) -> Option<String> {
        if metric.is_bot_only || self.dispatcher.config().renewal_email.is_some() {
            return None;
        }
        self.store.renewal_email().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read renewal contact");
            None
        })
    }

    fn handle_dispatch_failure(&self, metric: &WarnMetric, evaluation: &Evaluation) {
        if self.failure_policy != DispatchFailurePolicy::Rollback || !evaluation.wrote() {
            return;
        }

        match self
            .store
            .restore(metric, &evaluation.current, &evaluation.previous)
        {
            Ok(true) => tracing::info!(metric_id = %metric.id, "Rolled back fired status"),
            Ok(false) => tracing::warn!(
                metric_id = %metric.id,
                "Status changed since firing, not rolling back"
            ),
            Err(e) => tracing::error!(
                metric_id = %metric.id,
                error = %e,
                "Failed to roll back fired status"
            ),
        }
    }
}
