//! Persisted warn metric status records

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stored status tokens. These literals are part of the storage format.
const STATUS_TOKENS: &[(StoreStatus, &str)] = &[
    (StoreStatus::Unset, ""),
    (StoreStatus::LimitReached, "true"),
    (StoreStatus::RunOnce, "runonce"),
    (StoreStatus::Ack, "ack"),
];

/// Lifecycle position of a warn metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StoreStatus {
    #[default]
    Unset,
    /// Notification dispatched, awaiting acknowledgment
    LimitReached,
    /// Run-once notification dispatched; never fires again automatically
    RunOnce,
    Ack,
}

impl StoreStatus {
    pub fn as_token(&self) -> &'static str {
        STATUS_TOKENS
            .iter()
            .find(|(status, _)| status == self)
            .map(|(_, token)| *token)
            .unwrap_or("")
    }

    pub fn from_token(token: &str) -> Option<Self> {
        STATUS_TOKENS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(status, _)| *status)
    }

    /// Whether a notification has gone out for this status
    pub fn has_fired(&self) -> bool {
        matches!(self, StoreStatus::LimitReached | StoreStatus::RunOnce)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, StoreStatus::Unset)
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreStatus::Unset => write!(f, "unset"),
            other => write!(f, "{}", other.as_token()),
        }
    }
}

impl Serialize for StoreStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_token())
    }
}

impl<'de> Deserialize<'de> for StoreStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        StoreStatus::from_token(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown store status '{}'", token)))
    }
}

/// Per-metric status as stored under `warn_metric_<id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnMetricStatus {
    pub id: String,
    pub limit: i64,
    pub acked: bool,
    #[serde(default, skip_serializing_if = "StoreStatus::is_unset")]
    pub store_status: StoreStatus,
}

impl WarnMetricStatus {
    /// Status of a metric that has never been evaluated
    pub fn unset(id: impl Into<String>, limit: i64) -> Self {
        Self {
            id: id.into(),
            limit,
            acked: false,
            store_status: StoreStatus::Unset,
        }
    }

    pub fn with_store_status(mut self, store_status: StoreStatus) -> Self {
        self.store_status = store_status;
        self
    }

    /// Fired and not yet acknowledged
    pub fn is_pending(&self) -> bool {
        !self.acked && self.store_status.has_fired()
    }
}

/// Acknowledgment request body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendWarnMetricAck {
    #[serde(rename = "forceAck", default)]
    pub force_ack: bool,
}
