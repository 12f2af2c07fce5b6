//! Background warn metric job

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::time::interval;

use super::config::{AlertsConfig, DEFAULT_CHECK_INTERVAL};
use super::service::{CheckReport, WarnMetricService};
use crate::error::WarnMetricError;
use crate::metrics::Observation;

/// Supplies the current metric values for a check cycle
pub trait MetricSource: Send + Sync {
    fn observations(&self) -> HashMap<String, Observation>;
}

/// Latest observations pushed in by the host server
#[derive(Debug, Default)]
pub struct ObservationSnapshot {
    values: RwLock<HashMap<String, Observation>>,
}

impl ObservationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge new values into the snapshot
    pub fn record(&self, values: impl IntoIterator<Item = (String, Observation)>) {
        let mut current = self.values.write();
        current.extend(values);
    }

    pub fn get(&self, id: &str) -> Option<Observation> {
        self.values.read().get(id).copied()
    }
}

impl MetricSource for ObservationSnapshot {
    fn observations(&self) -> HashMap<String, Observation> {
        self.values.read().clone()
    }
}

/// Periodically evaluates all warn metrics, at most once per wait interval
pub struct WarnMetricJob {
    service: Arc<WarnMetricService>,
    source: Arc<dyn MetricSource>,
    /// How often to wake up and check whether a run is due
    check_interval: Duration,
    /// Minimum millis between runs, tracked through the store
    wait_ms: i64,
    running: AtomicBool,
    shutdown: Notify,
}

impl WarnMetricJob {
    pub fn new(
        service: Arc<WarnMetricService>,
        source: Arc<dyn MetricSource>,
        config: &AlertsConfig,
    ) -> Self {
        let check_interval = if config.check_interval.is_zero() {
            tracing::warn!(
                "Zero warn metric check interval, using {:?}",
                DEFAULT_CHECK_INTERVAL
            );
            DEFAULT_CHECK_INTERVAL
        } else {
            config.check_interval
        };

        Self {
            service,
            source,
            check_interval,
            wait_ms: config.job_wait_ms,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Start the background job
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                "Warn metric job started with interval {:?}, wait {} ms",
                self.check_interval,
                self.wait_ms
            );

            let mut ticker = interval(self.check_interval);

            while self.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = chrono::Utc::now().timestamp_millis();
                        match self.run_if_due(now).await {
                            Err(e) if e.is_transient() => {
                                tracing::warn!(error = %e, "Warn metric job run failed, retrying next tick");
                            }
                            Err(e) => tracing::error!(error = %e, "Warn metric job run failed"),
                            Ok(_) => {}
                        }
                    }
                    _ = self.shutdown.notified() => {}
                }
            }

            tracing::info!("Warn metric job stopped");
        })
    }

    /// Stop the job
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Check if the job is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a check cycle unless the previous one is more recent than the wait time.
    ///
    /// Returns `None` when skipped.
    pub async fn run_if_due(&self, now_ms: i64) -> Result<Option<Vec<CheckReport>>, WarnMetricError> {
        let store = self.service.store();

        if let Some(last) = store.last_run_timestamp()? {
            if now_ms.saturating_sub(last) < self.wait_ms {
                tracing::debug!(
                    last_run = last,
                    next_run = last.saturating_add(self.wait_ms),
                    "Warn metric run not due yet"
                );
                return Ok(None);
            }
        }

        let reports = self.run_now().await;
        store.set_last_run_timestamp(now_ms)?;
        Ok(Some(reports))
    }

    /// Run a check cycle immediately, ignoring the wait time
    pub async fn run_now(&self) -> Vec<CheckReport> {
        let observations = self.source.observations();
        self.service.run_checks(&observations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::evaluator::Decision;
    use crate::alerts::notifier::testing::RecordingTransport;
    use crate::metrics::registry::{WARN_METRIC_NUMBER_OF_CHANNELS_50, WARN_METRIC_NUMBER_OF_TEAMS_5};
    use crate::metrics::MetricRegistry;
    use crate::storage::MemoryKvStore;

    const WEEK_MS: i64 = 604_800_000;

    fn setup(config: &AlertsConfig) -> (Arc<RecordingTransport>, Arc<ObservationSnapshot>, Arc<WarnMetricJob>) {
        let transport = Arc::new(RecordingTransport::default());
        let service = Arc::new(WarnMetricService::new(
            Arc::new(MetricRegistry::builtin()),
            Arc::new(MemoryKvStore::new()),
            transport.clone(),
            config,
        ));
        let snapshot = Arc::new(ObservationSnapshot::new());
        let job = Arc::new(WarnMetricJob::new(service, snapshot.clone(), config));
        (transport, snapshot, job)
    }

    #[tokio::test]
    async fn test_wait_interval_is_honoured() {
        let (transport, snapshot, job) = setup(&AlertsConfig::default());
        snapshot.record([(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), Observation::Count(5))]);

        let start = 1_700_000_000_000;
        let first = job.run_if_due(start).await.unwrap().unwrap();
        assert_eq!(first[0].decision, Some(Decision::Fire));

        snapshot.record([(
            WARN_METRIC_NUMBER_OF_CHANNELS_50.to_string(),
            Observation::Count(70),
        )]);
        assert!(job.run_if_due(start + WEEK_MS - 1).await.unwrap().is_none());

        let later = job.run_if_due(start + WEEK_MS).await.unwrap().unwrap();
        let channels = later
            .iter()
            .find(|r| r.metric_id == WARN_METRIC_NUMBER_OF_CHANNELS_50)
            .unwrap();
        assert_eq!(channels.decision, Some(Decision::Fire));
        assert_eq!(transport.bot_messages.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_merges_values() {
        let snapshot = ObservationSnapshot::new();
        snapshot.record([("a".to_string(), Observation::Count(1))]);
        snapshot.record([
            ("a".to_string(), Observation::Count(2)),
            ("b".to_string(), Observation::Condition(true)),
        ]);

        assert_eq!(snapshot.get("a"), Some(Observation::Count(2)));
        assert_eq!(snapshot.observations().len(), 2);
    }

    #[tokio::test]
    async fn test_background_job_runs_and_stops() {
        let config = AlertsConfig::default()
            .with_check_interval(Duration::from_millis(10))
            .with_job_wait_ms(0);
        let (transport, snapshot, job) = setup(&config);
        snapshot.record([(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), Observation::Count(12))]);

        let handle = Arc::clone(&job).start();
        assert!(job.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        job.stop();
        handle.await.unwrap();

        assert!(!job.is_running());
        // Run-once metric notified a single time across many ticks
        assert_eq!(transport.bot_messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_default() {
        let config = AlertsConfig::default()
            .with_check_interval(Duration::ZERO)
            .with_job_wait_ms(0);
        let (transport, snapshot, job) = setup(&config);
        assert_eq!(job.check_interval, DEFAULT_CHECK_INTERVAL);
        snapshot.record([(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), Observation::Count(5))]);

        let handle = Arc::clone(&job).start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        job.stop();
        handle.await.unwrap();

        // The first tick completes immediately
        assert_eq!(transport.bot_messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_last_run_timestamp() {
        let (_, snapshot, job) = setup(&AlertsConfig::default());
        snapshot.record([(WARN_METRIC_NUMBER_OF_TEAMS_5.to_string(), Observation::Count(5))]);
        job.service.store().set_last_run_timestamp(i64::MIN).unwrap();

        let reports = job.run_if_due(1_700_000_000_000).await.unwrap().unwrap();
        assert_eq!(reports[0].decision, Some(Decision::Fire));
    }
}
