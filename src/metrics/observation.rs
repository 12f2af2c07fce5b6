//! Observed metric values supplied by the caller

use serde::{Deserialize, Serialize};

/// A value observed for one warn metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    /// Numeric counter, compared against the metric limit
    Count(i64),
    /// Caller asserts whether a qualitative condition holds
    Condition(bool),
}

impl From<i64> for Observation {
    fn from(value: i64) -> Self {
        Observation::Count(value)
    }
}

impl From<bool> for Observation {
    fn from(value: bool) -> Self {
        Observation::Condition(value)
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observation::Count(v) => write!(f, "{}", v),
            Observation::Condition(b) => write!(f, "{}", b),
        }
    }
}
