use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Log target for access entries, so they can be filtered separately
/// (`RUST_LOG=perch::access=info`).
pub const ACCESS_TARGET: &str = "perch::access";

/// Structured access log entry for one dispatched request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub request_id: String,
    pub plugin_id: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub response_status: u16,
    pub latency_ms: f64,
    /// `unary`, `streaming`, or `none` when no backend was contacted.
    pub transport: String,
}

impl AccessLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: &str,
        plugin_id: &str,
        client_ip: &str,
        method: &str,
        path: &str,
        response_status: u16,
        latency_ms: f64,
        transport: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
            plugin_id: plugin_id.to_string(),
            client_ip: client_ip.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            response_status,
            latency_ms,
            transport: transport.to_string(),
        }
    }

    /// Emit through `tracing` at [`ACCESS_TARGET`].
    pub fn emit(&self) {
        tracing::info!(
            target: ACCESS_TARGET,
            request_id = %self.request_id,
            plugin = %self.plugin_id,
            client_ip = %self.client_ip,
            method = %self.method,
            path = %self.path,
            status = self.response_status,
            latency_ms = self.latency_ms,
            transport = %self.transport,
            "{} {} {} {:.2}ms",
            self.method,
            self.path,
            self.response_status,
            self.latency_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_all_fields() {
        let entry = AccessLogEntry::new("rid", "stats", "1.2.3.4", "GET", "/summary", 200, 1.5, "unary");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["plugin_id"], "stats");
        assert_eq!(value["response_status"], 200);
        assert_eq!(value["transport"], "unary");
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn emit_without_subscriber_does_not_panic() {
        AccessLogEntry::new("rid", "p", "ip", "GET", "/", 429, 0.1, "none").emit();
    }
}
