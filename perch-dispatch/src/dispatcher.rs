//! Per-request dispatch: quota check, backend selection, invocation under a
//! deadline, and verbatim relay of the plugin's answer.

use crate::backend::{BackendSelector, PluginHandle, Registries};
use crate::key::{ClientIpResolver, rate_limit_key};
use crate::resolver::RouteResolver;
use crate::ui::UiAssets;
use bytes::Bytes;
use ipnet::IpNet;
use perch_core::config::DispatchConfig;
use perch_core::error::PerchError;
use perch_core::message::{ProxyRequest, ProxyResponse, normalize_path};
use perch_limiter::RateLimiter;
use perch_observability::access_log::AccessLogEntry;
use perch_observability::metrics::MetricsCollector;
use perch_plugin::plugin::{BackendError, Transport};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const UI_PLUGIN_ID: &str = "ui";
const MANIFESTS_PATH: &str = "/manifests";
const BUNDLE_PATH: &str = "/ui/bundle.js";
const REQUEST_ID_HEADER: &str = "X-Request-Id";
/// Metrics label for ids that matched no registered plugin.
const UNKNOWN_PLUGIN: &str = "unknown";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub unary_timeout: Duration,
    pub streaming_timeout: Duration,
    pub trusted_proxies: Vec<IpNet>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            unary_timeout: Duration::from_secs(10),
            streaming_timeout: Duration::from_secs(30),
            trusted_proxies: Vec::new(),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Result<Self, PerchError> {
        Ok(Self {
            unary_timeout: config.unary_timeout(),
            streaming_timeout: config.streaming_timeout(),
            trusted_proxies: config.trusted_proxy_nets()?,
        })
    }

    fn deadline(&self, transport: Transport) -> Duration {
        match transport {
            Transport::Unary => self.unary_timeout,
            Transport::Streaming => self.streaming_timeout,
        }
    }
}

/// One inbound request as the HTTP surface hands it over.
///
/// Headers and query keep their multi-values here; they are flattened
/// (last value wins) when the plugin request is built.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub plugin_id: String,
    pub method: String,
    /// Path below the plugin prefix, possibly empty.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Bytes,
    pub user_id: Option<String>,
    pub peer: Option<IpAddr>,
}

impl InboundRequest {
    pub fn new(plugin_id: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }
}

/// What the access log and metrics need to know about one request.
struct Exchange {
    request_id: String,
    plugin_id: String,
    client_ip: String,
    method: String,
    path: String,
    started: Instant,
}

pub struct Dispatcher {
    registries: Registries,
    resolver: RouteResolver,
    selector: BackendSelector,
    ui: UiAssets,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    client_ip: ClientIpResolver,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        registries: Registries,
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsCollector>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            resolver: RouteResolver::new(registries.streaming.clone(), registries.unary.clone()),
            selector: BackendSelector::new(registries.streaming.clone(), registries.unary.clone()),
            ui: UiAssets::new(registries.ui.clone()),
            client_ip: ClientIpResolver::new(settings.trusted_proxies.clone()),
            registries,
            limiter,
            metrics,
            settings,
        }
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Handle one request. Never fails: every outcome is a response.
    pub async fn handle(&self, inbound: InboundRequest) -> ProxyResponse {
        let path = normalize_path(&inbound.path);

        // ── UI assets ──
        if inbound.plugin_id == UI_PLUGIN_ID && path == MANIFESTS_PATH {
            return self.ui.list_manifests();
        }
        if path == BUNDLE_PATH {
            return self.ui.serve_bundle(&inbound.plugin_id);
        }

        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let InboundRequest {
            plugin_id,
            method,
            headers,
            query,
            body,
            user_id,
            peer,
            ..
        } = inbound;

        let req = ProxyRequest::new(method.clone(), &path)
            .with_headers(headers)
            .with_query(query)
            .with_body(body)
            .with_user(user_id);
        let exchange = Exchange {
            request_id,
            client_ip: self.client_ip.resolve(&req.headers, peer),
            plugin_id,
            method,
            path,
            started,
        };
        let Exchange {
            plugin_id,
            method,
            path,
            client_ip,
            ..
        } = &exchange;

        // ── Quota ──
        let mut rate_headers: Vec<(&'static str, String)> = Vec::new();
        let quota = self
            .resolver
            .resolve(plugin_id, method, path)
            .and_then(|route| route.rate_limit)
            .and_then(|policy| policy.resolve());
        if let Some(quota) = quota {
            let key = rate_limit_key(client_ip, method, plugin_id, path);
            let decision = self
                .limiter
                .check(&key, quota.requests_per_minute, quota.burst_limit);
            rate_headers.push(("X-RateLimit-Limit", quota.requests_per_minute.to_string()));
            rate_headers.push(("X-RateLimit-Remaining", decision.remaining.to_string()));
            rate_headers.push(("X-RateLimit-Reset", decision.reset_in.to_string()));

            if !decision.allowed {
                self.metrics.record_rate_limited(plugin_id);
                debug!(plugin_id = %plugin_id, method = %method, path = %path, "Quota exhausted");
                let resp = PerchError::QuotaExceeded {
                    retry_after: decision.reset_in,
                }
                .to_response();
                let transport = self.selector.select(plugin_id).map(|h| h.transport());
                return self.finish(&exchange, resp, &rate_headers, transport);
            }
        }

        // ── Backend ──
        let (outcome, transport) = self.forward(plugin_id, req).await;
        let resp = outcome.unwrap_or_else(|e| e.to_response());
        self.finish(&exchange, resp, &rate_headers, transport)
    }

    async fn forward(&self, plugin_id: &str, req: ProxyRequest) -> (Result<ProxyResponse, PerchError>, Option<Transport>) {
        let Some(handle) = self.selector.select(plugin_id) else {
            return (Err(PerchError::PluginNotFound), None);
        };
        let transport = handle.transport();
        if !handle.is_online() {
            return (Err(PerchError::PluginNotFound), Some(transport));
        }

        let deadline = self.settings.deadline(transport);
        let outcome = match call_with_deadline(handle, req, deadline).await {
            Ok(Some(resp)) if !(100..=999).contains(&resp.status) => {
                warn!(plugin_id = %plugin_id, status = resp.status, "Plugin returned invalid status");
                Err(PerchError::Upstream(format!("invalid status {}", resp.status)))
            }
            Ok(Some(resp)) => Ok(resp),
            Ok(None) => Err(PerchError::RouteNotFound),
            Err(e) => {
                warn!(plugin_id = %plugin_id, transport = %transport, error = %e, "Plugin call failed");
                Err(PerchError::Upstream(e.to_string()))
            }
        };
        (outcome, Some(transport))
    }

    fn finish(
        &self,
        exchange: &Exchange,
        resp: ProxyResponse,
        rate_headers: &[(&'static str, String)],
        transport: Option<Transport>,
    ) -> ProxyResponse {
        let mut out = ProxyResponse::new(resp.status);
        for (name, value) in rate_headers {
            out.set_header(*name, value.clone());
        }
        // Backend headers are copied verbatim and win on name clashes.
        for (name, value) in resp.headers {
            out.set_header(name, value);
        }
        if out.header(REQUEST_ID_HEADER).is_none() {
            out.set_header(REQUEST_ID_HEADER, exchange.request_id.as_str());
        }
        out.body = resp.body;

        let elapsed = exchange.started.elapsed();
        // Request-supplied ids only become labels once a backend exists.
        let plugin_label = match transport {
            Some(_) => exchange.plugin_id.as_str(),
            None => UNKNOWN_PLUGIN,
        };
        let transport = transport.map(|t| t.as_str()).unwrap_or("none");
        self.metrics
            .record_dispatch(plugin_label, transport, out.status, elapsed.as_secs_f64());
        AccessLogEntry::new(
            &exchange.request_id,
            &exchange.plugin_id,
            &exchange.client_ip,
            &exchange.method,
            &exchange.path,
            out.status,
            elapsed.as_secs_f64() * 1000.0,
            transport,
        )
        .emit();
        out
    }
}

/// Aborts the plugin task if the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the plugin call on its own task so a panicking plugin surfaces as
/// an error instead of tearing down the request handler.
async fn call_with_deadline(
    handle: PluginHandle,
    req: ProxyRequest,
    deadline: Duration,
) -> Result<Option<ProxyResponse>, BackendError> {
    let id = handle.id().to_string();
    let mut task = AbortOnDrop(tokio::spawn(async move { handle.invoke(req).await }));
    match tokio::time::timeout(deadline, &mut task.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => {
            warn!(plugin_id = %id, "Plugin task panicked");
            Err(BackendError::Panicked)
        }
        Ok(Err(e)) => Err(BackendError::Transport(e.to_string())),
        Err(_) => Err(BackendError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_config() {
        let config = DispatchConfig {
            unary_timeout_ms: 1500,
            streaming_timeout_ms: 2500,
            trusted_proxies: vec!["10.0.0.0/8".into()],
            ..DispatchConfig::default()
        };
        let s = DispatchSettings::from_config(&config).unwrap();
        assert_eq!(s.unary_timeout, Duration::from_millis(1500));
        assert_eq!(s.streaming_timeout, Duration::from_millis(2500));
        assert_eq!(s.deadline(Transport::Streaming), Duration::from_millis(2500));
        assert_eq!(s.trusted_proxies.len(), 1);
    }

    #[test]
    fn bad_proxy_entry_is_config_error() {
        let config = DispatchConfig {
            trusted_proxies: vec!["not-a-net".into()],
            ..DispatchConfig::default()
        };
        assert!(matches!(
            DispatchSettings::from_config(&config),
            Err(PerchError::Config(_))
        ));
    }

    #[test]
    fn default_deadlines() {
        let s = DispatchSettings::default();
        assert_eq!(s.deadline(Transport::Unary), Duration::from_secs(10));
        assert_eq!(s.deadline(Transport::Streaming), Duration::from_secs(30));
    }
}
