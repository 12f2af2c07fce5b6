//! Warn metric job and notification configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wake-up interval of the background job
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Minimum time between two evaluation cycles (7 days, in millis)
pub const JOB_WAIT_TIME_MS: i64 = 1000 * 3600 * 24 * 7;

/// What to do with a fired status when its notification could not be sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailurePolicy {
    /// Leave the metric fired; resending needs an administrative reset
    #[default]
    KeepFired,
    /// Put the pre-fire status back so the next cycle can fire again
    Rollback,
}

impl FromStr for DispatchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "keep_fired" => Ok(DispatchFailurePolicy::KeepFired),
            "rollback" => Ok(DispatchFailurePolicy::Rollback),
            other => Err(format!("unknown dispatch failure policy '{}'", other)),
        }
    }
}

/// Where and how notifications are delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Channel receiving bot messages for system administrators
    pub admin_channel: String,
    /// Recipient for email metrics; falls back to the stored renewal contact
    pub renewal_email: Option<String>,
    /// Used when neither the config nor the store names a recipient
    pub fallback_email: String,
    pub site_name: String,
    pub site_url: String,
    /// Bot message webhook; log-only delivery when unset
    pub bot_webhook_url: Option<String>,
    /// Email relay webhook; log-only delivery when unset
    pub email_webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_channel: "town-square".to_string(),
            renewal_email: None,
            fallback_email: "sales@localhost".to_string(),
            site_name: "Server".to_string(),
            site_url: "http://localhost:8065".to_string(),
            bot_webhook_url: None,
            email_webhook_url: None,
        }
    }
}

/// Warn metric engine configuration
#[derive(Debug, Clone)]
pub struct AlertsConfig {
    /// How often the background job wakes up to check whether a run is due
    pub check_interval: Duration,
    /// Minimum millis between two evaluation cycles
    pub job_wait_ms: i64,
    pub failure_policy: DispatchFailurePolicy,
    pub notifications: NotificationConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            job_wait_ms: JOB_WAIT_TIME_MS,
            failure_policy: DispatchFailurePolicy::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AlertsConfig {
    /// Read configuration from environment variables
    /// WARNWATCH_CHECK_INTERVAL_SECS=3600
    /// WARNWATCH_JOB_WAIT_MS=604800000
    /// WARNWATCH_DISPATCH_FAILURE_POLICY=keep|rollback
    /// WARNWATCH_ADMIN_CHANNEL=town-square
    /// WARNWATCH_RENEWAL_EMAIL=billing@example.com
    /// WARNWATCH_SITE_NAME, WARNWATCH_SITE_URL
    /// WARNWATCH_BOT_WEBHOOK_URL, WARNWATCH_EMAIL_WEBHOOK_URL
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let check_interval = env("WARNWATCH_CHECK_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.check_interval);

        let job_wait_ms = env("WARNWATCH_JOB_WAIT_MS")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.job_wait_ms);

        let failure_policy = match env("WARNWATCH_DISPATCH_FAILURE_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to keep_fired");
                DispatchFailurePolicy::KeepFired
            }),
            None => defaults.failure_policy,
        };

        let base = defaults.notifications;
        let notifications = NotificationConfig {
            admin_channel: env("WARNWATCH_ADMIN_CHANNEL").unwrap_or(base.admin_channel),
            renewal_email: env("WARNWATCH_RENEWAL_EMAIL"),
            fallback_email: base.fallback_email,
            site_name: env("WARNWATCH_SITE_NAME").unwrap_or(base.site_name),
            site_url: env("WARNWATCH_SITE_URL").unwrap_or(base.site_url),
            bot_webhook_url: env("WARNWATCH_BOT_WEBHOOK_URL"),
            email_webhook_url: env("WARNWATCH_EMAIL_WEBHOOK_URL"),
        };

        Self {
            check_interval,
            job_wait_ms,
            failure_policy,
            notifications,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_job_wait_ms(mut self, wait_ms: i64) -> Self {
        self.job_wait_ms = wait_ms;
        self
    }

    pub fn with_failure_policy(mut self, policy: DispatchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}
