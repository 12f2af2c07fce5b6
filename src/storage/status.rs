//! Warn metric status records on top of a [`KvStore`]

use std::sync::Arc;

use super::kv::{KvStore, StoreError};
use crate::error::WarnMetricError;
use crate::metrics::{WarnMetric, WarnMetricStatus};

/// Prefix of every status key; the metric id follows it verbatim
pub const STATUS_KEY_PREFIX: &str = "warn_metric_";

/// System key holding the last job run (unix millis)
pub const LAST_RUN_TIMESTAMP_KEY: &str = "LastWarnMetricRunTimestamp";

/// System key holding the renewal/billing contact address
pub const RENEWAL_EMAIL_KEY: &str = "CloudRenewalEmail";

const MAX_CAS_ATTEMPTS: usize = 32;

/// Outcome of a status update closure
#[derive(Debug)]
pub enum Transition<T> {
    /// Leave the stored record untouched
    Keep(T),
    /// Replace the stored record
    Write(WarnMetricStatus, T),
}

/// A status record together with the raw bytes it was decoded from
#[derive(Debug, Clone)]
pub struct LoadedStatus {
    pub status: WarnMetricStatus,
    /// `None` when no record was stored yet
    pub raw: Option<Vec<u8>>,
}

/// Reads and writes per-metric status records
#[derive(Clone)]
pub struct StatusStore {
    kv: Arc<dyn KvStore>,
}

impl StatusStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn key(id: &str) -> String {
        format!("{}{}", STATUS_KEY_PREFIX, id)
    }

    /// Load a metric's status; a missing record reads as unset
    pub fn load(&self, metric: &WarnMetric) -> Result<LoadedStatus, WarnMetricError> {
        let raw = self.kv.get(&Self::key(&metric.id))?;
        let status = match &raw {
            Some(bytes) => decode(&metric.id, bytes)?,
            None => WarnMetricStatus::unset(&metric.id, metric.limit),
        };
        Ok(LoadedStatus { status, raw })
    }

    /// Atomically apply `decide` to the current status.
    ///
    /// `decide` may run several times when other writers race on the same
    /// key; each run sees the freshest record. The returned value comes
    /// from the run whose write (or keep) took effect.
    pub fn update<T, F>(&self, metric: &WarnMetric, mut decide: F) -> Result<T, WarnMetricError>
    where
        F: FnMut(&WarnMetricStatus) -> Transition<T>,
    {
        let key = Self::key(&metric.id);

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.load(metric)?;

            let (next, value) = match decide(&current.status) {
                Transition::Keep(value) => return Ok(value),
                Transition::Write(next, value) => (next, value),
            };

            let bytes = encode(&next)?;
            if self
                .kv
                .compare_and_set(&key, current.raw.as_deref(), &bytes)?
            {
                return Ok(value);
            }

            tracing::debug!(
                metric_id = %metric.id,
                attempt,
                "Status changed underneath update, retrying"
            );
        }

        Err(StoreError::Contention(key).into())
    }

    /// Put back `previous` only if the record still holds `written`
    pub fn restore(
        &self,
        metric: &WarnMetric,
        written: &WarnMetricStatus,
        previous: &WarnMetricStatus,
    ) -> Result<bool, WarnMetricError> {
        let key = Self::key(&metric.id);
        let current = self.kv.get(&key)?;

        let still_written = match &current {
            Some(bytes) => decode(&metric.id, bytes)? == *written,
            None => false,
        };
        if !still_written {
            return Ok(false);
        }

        let replacement = encode(previous)?;
        Ok(self
            .kv
            .compare_and_set(&key, current.as_deref(), &replacement)?)
    }

    /// Every stored status record, keyed by metric id
    pub fn list(&self) -> Result<Vec<WarnMetricStatus>, WarnMetricError> {
        let mut records = Vec::new();
        for key in self.kv.keys_with_prefix(STATUS_KEY_PREFIX)? {
            let id = &key[STATUS_KEY_PREFIX.len()..];
            if let Some(bytes) = self.kv.get(&key)? {
                match decode(id, &bytes) {
                    Ok(status) => records.push(status),
                    Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable status"),
                }
            }
        }
        Ok(records)
    }

    pub fn last_run_timestamp(&self) -> Result<Option<i64>, WarnMetricError> {
        let Some(bytes) = self.kv.get(LAST_RUN_TIMESTAMP_KEY)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        text.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| WarnMetricError::Corrupt {
                id: LAST_RUN_TIMESTAMP_KEY.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn set_last_run_timestamp(&self, millis: i64) -> Result<(), WarnMetricError> {
        self.kv
            .set(LAST_RUN_TIMESTAMP_KEY, millis.to_string().as_bytes())?;
        Ok(())
    }

    /// Renewal contact stored by the billing system, if any
    pub fn renewal_email(&self) -> Result<Option<String>, WarnMetricError> {
        Ok(self
            .kv
            .get(RENEWAL_EMAIL_KEY)?
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .filter(|email| !email.is_empty()))
    }
}

fn decode(id: &str, bytes: &[u8]) -> Result<WarnMetricStatus, WarnMetricError> {
    serde_json::from_slice(bytes).map_err(|e| WarnMetricError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn encode(status: &WarnMetricStatus) -> Result<Vec<u8>, WarnMetricError> {
    serde_json::to_vec(status).map_err(|e| WarnMetricError::Corrupt {
        id: status.id.clone(),
        reason: e.to_string(),
    })
}
