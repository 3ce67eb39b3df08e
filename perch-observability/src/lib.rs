pub mod access_log;
pub mod metrics;

pub use access_log::AccessLogEntry;
pub use metrics::MetricsCollector;
