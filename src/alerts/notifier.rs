//! Notification dispatch for fired warn metrics

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::config::NotificationConfig;
use crate::error::WarnMetricError;
use crate::metrics::{
    MetricRegistry, Observation, TemplateVars, WarnMetric, WarnMetricDisplayTexts,
};

/// Call-to-action attached to a bot message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotAction {
    pub label: String,
    /// Route the administrator's click acknowledges
    pub ack_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotMessage {
    pub channel: String,
    pub title: String,
    pub body: String,
    /// Absent for display-only notifications
    pub action: Option<BotAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivery channels for warn metric notifications
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send_bot_message(&self, message: &BotMessage) -> Result<(), NotifierError>;

    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotifierError>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send_bot_message(&self, message: &BotMessage) -> Result<(), NotifierError> {
        tracing::warn!(
            channel = %message.channel,
            actionable = message.action.is_some(),
            "Bot notification: {}: {}",
            message.title,
            message.body
        );
        Ok(())
    }

    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotifierError> {
        tracing::warn!(
            recipient = %email.recipient,
            "Email notification: {}: {}",
            email.subject,
            email.body
        );
        Ok(())
    }
}

/// Posts notifications as JSON to HTTP webhooks.
///
/// A channel without a configured URL falls back to [`LogTransport`].
pub struct WebhookTransport {
    client: reqwest::Client,
    bot_url: Option<String>,
    email_url: Option<String>,
}

impl WebhookTransport {
    pub fn new(bot_url: Option<String>, email_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_url,
            email_url,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(url = %url, "Webhook notification sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send_bot_message(&self, message: &BotMessage) -> Result<(), NotifierError> {
        match &self.bot_url {
            Some(url) => {
                let payload = serde_json::json!({
                    "channel": message.channel,
                    "title": message.title,
                    "text": message.body,
                    "action": message.action,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                });
                self.post(url, &payload).await
            }
            None => LogTransport.send_bot_message(message).await,
        }
    }

    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotifierError> {
        match &self.email_url {
            Some(url) => self
                .post(url, email)
                .await
                .map_err(|e| NotifierError::Email(e.to_string())),
            None => LogTransport.send_email(email).await,
        }
    }
}

/// Per-dispatch inputs
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Value that made the metric fire
    pub observed: Option<Observation>,
    /// Email recipient overriding the configured one
    pub recipient: Option<String>,
}

/// Where a notification went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchOutcome {
    BotMessage { channel: String },
    Email { recipient: String },
}

/// Composes notifications from display texts and routes them
pub struct NotificationDispatcher {
    registry: Arc<MetricRegistry>,
    transport: Arc<dyn NotificationTransport>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<MetricRegistry>,
        transport: Arc<dyn NotificationTransport>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Send the notification for a fired metric
    pub async fn dispatch(
        &self,
        metric: &WarnMetric,
        context: &DispatchContext,
    ) -> Result<DispatchOutcome, WarnMetricError> {
        let texts = self.registry.display_texts(&metric.id);
        let value = context
            .observed
            .map(|o| o.to_string())
            .unwrap_or_else(|| metric.limit.to_string());
        let vars = TemplateVars {
            site_name: &self.config.site_name,
            site_url: &self.config.site_url,
            limit: metric.limit,
            value: &value,
        };

        if metric.is_bot_only {
            let action = (!metric.skip_action).then(|| BotAction {
                label: "Contact us".to_string(),
                ack_path: format!("/warn_metrics/ack/{}", metric.id),
            });
            let message = BotMessage {
                channel: self.config.admin_channel.clone(),
                title: WarnMetricDisplayTexts::render(&texts.bot_title, &vars),
                body: WarnMetricDisplayTexts::render(&texts.bot_message_body, &vars),
                action,
            };

            self.transport.send_bot_message(&message).await?;
            tracing::info!(metric_id = %metric.id, channel = %message.channel, "Bot notification sent");
            Ok(DispatchOutcome::BotMessage {
                channel: message.channel,
            })
        } else {
            let recipient = self.recipient(context);
            let mut body = WarnMetricDisplayTexts::render(&texts.email_body, &vars);
            if !metric.skip_action {
                body.push_str(&format!(
                    "\n\nReply to this message or visit {} to get in touch.",
                    self.config.site_url
                ));
            }
            let email = EmailMessage {
                recipient: recipient.clone(),
                subject: WarnMetricDisplayTexts::render(&texts.email_subject, &vars),
                body,
            };

            self.transport.send_email(&email).await?;
            tracing::info!(metric_id = %metric.id, recipient = %recipient, "Email notification sent");
            Ok(DispatchOutcome::Email { recipient })
        }
    }

    /// Follow-up message once an administrator has acknowledged a bot metric.
    ///
    /// Email metrics have no follow-up and return `None`.
    pub async fn dispatch_ack_success(
        &self,
        metric: &WarnMetric,
    ) -> Result<Option<DispatchOutcome>, WarnMetricError> {
        if !metric.is_bot_only {
            return Ok(None);
        }

        let texts = self.registry.display_texts(&metric.id);
        let limit = metric.limit.to_string();
        let vars = TemplateVars {
            site_name: &self.config.site_name,
            site_url: &self.config.site_url,
            limit: metric.limit,
            value: &limit,
        };
        let message = BotMessage {
            channel: self.config.admin_channel.clone(),
            title: WarnMetricDisplayTexts::render(&texts.bot_title, &vars),
            body: WarnMetricDisplayTexts::render(&texts.bot_success_message, &vars),
            action: None,
        };

        self.transport.send_bot_message(&message).await?;
        Ok(Some(DispatchOutcome::BotMessage {
            channel: message.channel,
        }))
    }

    fn recipient(&self, context: &DispatchContext) -> String {
        context
            .recipient
            .clone()
            .or_else(|| self.config.renewal_email.clone())
            .unwrap_or_else(|| self.config.fallback_email.clone())
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}
