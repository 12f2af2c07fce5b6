//! warnwatch: Warn-Metric Threshold Monitoring
//!
//! Tracks server usage metrics against a fixed table of thresholds and
//! notifies administrators once when a metric crosses its limit, keeping a
//! persisted acknowledgment state per metric.
//!
//! # Features
//!
//! - **Fixed Metric Registry**: team, channel, active-user and post thresholds plus
//!   qualitative MFA and email-domain checks
//! - **Fire-Once Semantics**: compare-and-set status transitions, safe under
//!   concurrent evaluation
//! - **Acknowledgments**: normal and forced acks, skip-action metrics
//! - **Notifications**: bot messages for administrators, email for billing contacts
//! - **Background Job**: periodic evaluation honouring a weekly wait interval
//! - **HTTP API**: evaluate, acknowledge, inspect and run check cycles
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warnwatch::alerts::{Decision, ThresholdEvaluator};
//! use warnwatch::metrics::MetricRegistry;
//! use warnwatch::storage::{MemoryKvStore, StatusStore};
//!
//! let registry = Arc::new(MetricRegistry::builtin());
//! let store = StatusStore::new(Arc::new(MemoryKvStore::new()));
//! let evaluator = ThresholdEvaluator::new(registry, store);
//!
//! let decision = evaluator.evaluate("warn_metric_number_of_teams_5", 5i64).unwrap();
//! assert_eq!(decision, Decision::Fire);
//! ```

pub mod alerts;
pub mod api;
pub mod error;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use alerts::{Decision, WarnMetricService};
pub use error::WarnMetricError;
pub use metrics::{MetricRegistry, Observation, StoreStatus, WarnMetric, WarnMetricStatus};
pub use storage::{KvStore, StatusStore};
