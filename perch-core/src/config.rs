use crate::error::PerchError;
use crate::route::RouteSpec;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Statically declared unary plugins reached over HTTP.
    #[serde(default)]
    pub plugins: Vec<PluginDecl>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

/// Backend invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_unary_timeout")]
    pub unary_timeout_ms: u64,
    #[serde(default = "default_streaming_timeout")]
    pub streaming_timeout_ms: u64,
    /// Peers allowed to set `CF-Connecting-IP` / `X-Real-IP`.
    /// Empty means the headers are always honored.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

/// Rate limiter sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_shard_capacity")]
    pub shard_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A plugin declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDecl {
    pub id: String,
    /// Base URL of the plugin's HTTP endpoint.
    pub url: String,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub ui: Option<UiDecl>,
}

/// UI manifest for a declared plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: String,
    /// JavaScript bundle on disk. Absent means the plugin has no bundle.
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,
    /// Free-form manifest fields passed through to the frontend.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:8080".into() }
fn default_unary_timeout() -> u64 { 10_000 }
fn default_streaming_timeout() -> u64 { 30_000 }
fn default_max_body() -> usize { 8 * 1024 * 1024 }
fn default_shards() -> usize { 64 }
fn default_shard_capacity() -> usize { 10_000 }
fn default_metrics_path() -> String { "/metrics".into() }
fn default_log_level() -> String { "info".into() }
fn default_true() -> bool { true }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_addr() }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            unary_timeout_ms: default_unary_timeout(),
            streaming_timeout_ms: default_streaming_timeout(),
            trusted_proxies: Vec::new(),
            max_body_bytes: default_max_body(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            shard_capacity: default_shard_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl DispatchConfig {
    pub fn unary_timeout(&self) -> Duration {
        Duration::from_millis(self.unary_timeout_ms)
    }

    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_millis(self.streaming_timeout_ms)
    }

    /// Parse `trusted_proxies`; bare addresses become host networks.
    pub fn trusted_proxy_nets(&self) -> Result<Vec<IpNet>, PerchError> {
        self.trusted_proxies
            .iter()
            .map(|entry| {
                entry
                    .parse::<IpNet>()
                    .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| PerchError::Config(format!("invalid trusted proxy '{entry}'")))
            })
            .collect()
    }
}

impl PerchConfig {
    /// Load configuration from YAML file + env overrides
    /// (`PERCH_DISPATCH__UNARY_TIMEOUT_MS=5000`).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: PerchConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PERCH_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), PerchError> {
        if self.limiter.shards == 0 {
            return Err(PerchError::Config("limiter.shards must be positive".into()));
        }
        if self.limiter.shard_capacity == 0 {
            return Err(PerchError::Config("limiter.shard_capacity must be positive".into()));
        }
        if self.dispatch.unary_timeout_ms == 0 || self.dispatch.streaming_timeout_ms == 0 {
            return Err(PerchError::Config("dispatch timeouts must be positive".into()));
        }
        self.dispatch.trusted_proxy_nets()?;

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if plugin.id.is_empty() {
                return Err(PerchError::Config("plugin id must not be empty".into()));
            }
            if plugin.id == "ui" {
                return Err(PerchError::Config("plugin id 'ui' is reserved".into()));
            }
            if !seen.insert(plugin.id.as_str()) {
                return Err(PerchError::Config(format!("duplicate plugin id '{}'", plugin.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── Default values ────────────────────────────────────────────

    #[test]
    fn default_dispatch_config_has_expected_values() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.unary_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.streaming_timeout(), Duration::from_secs(30));
        assert!(cfg.trusted_proxies.is_empty());
        assert_eq!(cfg.max_body_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn default_limiter_config_has_expected_values() {
        let cfg = LimiterConfig::default();
        assert_eq!(cfg.shards, 64);
        assert_eq!(cfg.shard_capacity, 10_000);
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = PerchConfig::default();
        assert_eq!(cfg.server.addr, "0.0.0.0:8080");
        assert!(!cfg.observability.metrics.enabled);
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert!(cfg.validate().is_ok());
    }

    // ── Validation ────────────────────────────────────────────────

    #[test]
    fn trusted_proxies_accept_cidrs_and_bare_addresses() {
        let cfg = DispatchConfig {
            trusted_proxies: vec!["10.0.0.0/8".into(), "192.168.1.7".into(), "::1".into()],
            ..DispatchConfig::default()
        };
        let nets = cfg.trusted_proxy_nets().unwrap();
        assert_eq!(nets.len(), 3);
        assert!(nets[1].contains(&"192.168.1.7".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn invalid_trusted_proxy_is_rejected() {
        let mut cfg = PerchConfig::default();
        cfg.dispatch.trusted_proxies = vec!["not-an-ip".into()];
        assert!(matches!(cfg.validate(), Err(PerchError::Config(_))));
    }

    #[test]
    fn zero_shards_is_rejected() {
        let mut cfg = PerchConfig::default();
        cfg.limiter.shards = 0;
        assert!(cfg.validate().is_err());
    }

    fn decl(id: &str) -> PluginDecl {
        PluginDecl {
            id: id.into(),
            url: "http://127.0.0.1:9000".into(),
            online: true,
            routes: vec![],
            ui: None,
        }
    }

    #[test]
    fn duplicate_and_reserved_plugin_ids_are_rejected() {
        let mut cfg = PerchConfig::default();
        cfg.plugins = vec![decl("stats"), decl("stats")];
        assert!(cfg.validate().is_err());

        cfg.plugins = vec![decl("ui")];
        assert!(cfg.validate().is_err());

        cfg.plugins = vec![decl("")];
        assert!(cfg.validate().is_err());
    }

    // ── PerchConfig::load() ───────────────────────────────────────

    #[test]
    fn load_from_valid_yaml_overrides_defaults() {
        let yaml = r#"
server:
  addr: "127.0.0.1:9999"
dispatch:
  unary_timeout_ms: 2500
  trusted_proxies: ["10.0.0.0/8"]
logging:
  format: json
plugins:
  - id: stats
    url: "http://127.0.0.1:7001"
    routes:
      - method: GET
        path: /summary
        rate_limit:
          preset: read
      - path: /admin/*
        rate_limit:
          requests_per_minute: 5
    ui:
      name: Stats
      version: "1.2.0"
      bundle_path: /opt/stats/bundle.js
      extra:
        icon: chart
"#;
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "{yaml}").unwrap();
        let cfg = PerchConfig::load(tmpfile.path()).unwrap();

        assert_eq!(cfg.server.addr, "127.0.0.1:9999");
        assert_eq!(cfg.dispatch.unary_timeout_ms, 2500);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.dispatch.streaming_timeout_ms, 30_000);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let stats = &cfg.plugins[0];
        assert!(stats.online);
        assert_eq!(stats.routes.len(), 2);
        assert_eq!(stats.routes[1].method, "*");
        assert_eq!(
            stats.routes[1].rate_limit.as_ref().unwrap().requests_per_minute,
            5
        );
        let ui = stats.ui.as_ref().unwrap();
        assert_eq!(ui.name.as_deref(), Some("Stats"));
        assert_eq!(ui.extra["icon"], "chart");
    }

    #[test]
    fn load_rejects_invalid_config() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "limiter:\n  shards: 0\n").unwrap();
        assert!(PerchConfig::load(tmpfile.path()).is_err());
    }

    #[test]
    fn log_format_serializes_to_lowercase() {
        assert_eq!(serde_yaml::to_string(&LogFormat::Json).unwrap().trim(), "json");
    }
}
