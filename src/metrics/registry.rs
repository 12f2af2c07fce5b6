//! Fixed table of known warn metrics

use std::collections::HashMap;

use serde::Serialize;

use super::texts::{builtin_texts, WarnMetricDisplayTexts};

pub const WARN_METRIC_MFA: &str = "warn_metric_mfa";
pub const WARN_METRIC_EMAIL_DOMAIN: &str = "warn_metric_email_domain";
pub const WARN_METRIC_NUMBER_OF_TEAMS_5: &str = "warn_metric_number_of_teams_5";
pub const WARN_METRIC_NUMBER_OF_CHANNELS_50: &str = "warn_metric_number_of_channels_50";
pub const WARN_METRIC_NUMBER_OF_ACTIVE_USERS_100: &str = "warn_metric_number_of_active_users_100";
pub const WARN_METRIC_NUMBER_OF_ACTIVE_USERS_200: &str = "warn_metric_number_of_active_users_200";
pub const WARN_METRIC_NUMBER_OF_ACTIVE_USERS_300: &str = "warn_metric_number_of_active_users_300";
pub const WARN_METRIC_NUMBER_OF_ACTIVE_USERS_500: &str = "warn_metric_number_of_active_users_500";
pub const WARN_METRIC_NUMBER_OF_POSTS_2M: &str = "warn_metric_number_of_posts_2M";

/// Active-user tier below the registered ones; defined but not registered
pub const NUMBER_OF_ACTIVE_USERS_25: i64 = 25;

/// Limit value marking a qualitative metric
pub const NO_LIMIT: i64 = -1;

/// A registered warn metric rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarnMetric {
    pub id: String,
    /// Numeric threshold, or [`NO_LIMIT`] for qualitative metrics
    pub limit: i64,
    /// Notify through the in-product bot rather than email
    pub is_bot_only: bool,
    /// Never notify again once fired, until acknowledged
    pub is_run_once: bool,
    /// Notification carries no call-to-action
    pub skip_action: bool,
}

impl WarnMetric {
    pub fn new(id: impl Into<String>, limit: i64) -> Self {
        Self {
            id: id.into(),
            limit,
            is_bot_only: true,
            is_run_once: true,
            skip_action: false,
        }
    }

    pub fn with_bot_only(mut self, bot_only: bool) -> Self {
        self.is_bot_only = bot_only;
        self
    }

    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.is_run_once = run_once;
        self
    }

    pub fn with_skip_action(mut self, skip_action: bool) -> Self {
        self.skip_action = skip_action;
        self
    }

    /// True when the metric has no numeric threshold
    pub fn is_qualitative(&self) -> bool {
        self.limit == NO_LIMIT
    }
}

/// Immutable registry of warn metrics, built once at startup
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: Vec<WarnMetric>,
    index: HashMap<String, usize>,
    texts: HashMap<String, WarnMetricDisplayTexts>,
}

impl MetricRegistry {
    /// Build a registry from a fixed list of rules.
    ///
    /// A later entry with a duplicate id replaces the earlier one.
    pub fn new(metrics: impl IntoIterator<Item = WarnMetric>) -> Self {
        let mut list: Vec<WarnMetric> = Vec::new();
        let mut index = HashMap::new();

        for metric in metrics {
            match index.get(&metric.id) {
                Some(&pos) => list[pos] = metric,
                None => {
                    index.insert(metric.id.clone(), list.len());
                    list.push(metric);
                }
            }
        }

        Self {
            metrics: list,
            index,
            texts: builtin_texts(),
        }
    }

    /// The standard table of server warn metrics
    pub fn builtin() -> Self {
        Self::new([
            WarnMetric::new(WARN_METRIC_MFA, NO_LIMIT),
            WarnMetric::new(WARN_METRIC_EMAIL_DOMAIN, NO_LIMIT),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_TEAMS_5, 5),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_CHANNELS_50, 50),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_100, 100),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_200, 200),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_300, 300),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_ACTIVE_USERS_500, 500).with_bot_only(false),
            WarnMetric::new(WARN_METRIC_NUMBER_OF_POSTS_2M, 2_000_000).with_bot_only(false),
        ])
    }

    pub fn lookup(&self, id: &str) -> Option<&WarnMetric> {
        self.index.get(id).map(|&pos| &self.metrics[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Metrics in registration order
    pub fn iter(&self) -> impl Iterator<Item = &WarnMetric> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Display texts for a metric, falling back to generic wording
    pub fn display_texts(&self, id: &str) -> WarnMetricDisplayTexts {
        self.texts
            .get(id)
            .cloned()
            .unwrap_or_else(|| WarnMetricDisplayTexts::generic(id))
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
