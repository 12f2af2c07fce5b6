//! Warn metric definitions, observed values and persisted status

pub mod observation;
pub mod registry;
pub mod status;
pub mod texts;

pub use observation::Observation;
pub use registry::{MetricRegistry, WarnMetric, NO_LIMIT};
pub use status::{SendWarnMetricAck, StoreStatus, WarnMetricStatus};
pub use texts::{TemplateVars, WarnMetricDisplayTexts};
