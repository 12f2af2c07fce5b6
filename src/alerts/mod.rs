//! Warn metric alerting
//!
//! Threshold evaluation with persisted fire-once state, acknowledgment
//! handling, notification dispatch and the periodic background job.

pub mod ack;
pub mod checker;
pub mod config;
pub mod evaluator;
pub mod notifier;
pub mod service;

pub use ack::{AckHandler, AckOutcome};
pub use checker::{MetricSource, ObservationSnapshot, WarnMetricJob};
pub use config::{AlertsConfig, DispatchFailurePolicy, NotificationConfig};
pub use evaluator::{Decision, Evaluation, ThresholdEvaluator};
pub use notifier::{
    BotMessage, DispatchContext, DispatchOutcome, EmailMessage, LogTransport,
    NotificationDispatcher, NotificationTransport, NotifierError, WebhookTransport,
};
pub use service::{CheckReport, WarnMetricService};
