use crate::matcher;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A route declared by a plugin manifest.
///
/// Route tables are owned by plugin supervision and replaced wholesale on
/// reload; the dispatch layer only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSpec {
    /// Owning plugin. Filled in by the loader when declared inline.
    #[serde(default)]
    pub plugin_id: String,

    /// Exact HTTP verb, or `*` for any method.
    #[serde(default = "default_method")]
    pub method: String,

    /// Path pattern (see [`matcher::match_path`]).
    pub path: String,

    /// Quota applied to requests hitting this route.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
}

fn default_method() -> String {
    "*".into()
}

impl RouteSpec {
    pub fn new(plugin_id: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            method: method.into(),
            path: path.into(),
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Whether this route accepts `method` on `path`.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        (self.method == "*" || self.method.eq_ignore_ascii_case(method))
            && matcher::match_path(&self.path, path)
    }
}

/// Rate-limit declaration attached to a route.
///
/// Either a named preset or explicit numbers. A non-empty preset wins over
/// explicit numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RateLimitPolicy {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub requests_per_minute: i64,
    #[serde(default)]
    pub burst_limit: i64,
}

/// A resolved, strictly positive quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub requests_per_minute: u32,
    pub burst_limit: u32,
}

/// Built-in presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Read,
    Write,
    Strict,
}

impl Preset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Preset::Read),
            "write" => Some(Preset::Write),
            "strict" => Some(Preset::Strict),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Read => "read",
            Preset::Write => "write",
            Preset::Strict => "strict",
        }
    }

    pub fn quota(&self) -> Quota {
        let (requests_per_minute, burst_limit) = match self {
            Preset::Read => (60, 80),
            Preset::Write => (30, 40),
            Preset::Strict => (10, 15),
        };
        Quota {
            requests_per_minute,
            burst_limit,
        }
    }
}

impl RateLimitPolicy {
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn explicit(requests_per_minute: i64, burst_limit: i64) -> Self {
        Self {
            preset: None,
            requests_per_minute,
            burst_limit,
        }
    }

    /// Resolve to a concrete quota.
    ///
    /// Unknown presets and non-positive rates resolve to `None`: the route
    /// is served without a limit rather than blocked.
    pub fn resolve(&self) -> Option<Quota> {
        if let Some(name) = self.preset.as_deref().filter(|n| !n.is_empty()) {
            return match Preset::from_name(name) {
                Some(preset) => Some(preset.quota()),
                None => {
                    warn!(preset = %name, "Unknown rate-limit preset, route left unlimited");
                    None
                }
            };
        }

        if self.requests_per_minute <= 0 {
            return None;
        }

        let rpm = clamp_u32(self.requests_per_minute);
        let burst = if self.burst_limit <= 0 {
            rpm
        } else {
            clamp_u32(self.burst_limit)
        };
        Some(Quota {
            requests_per_minute: rpm,
            burst_limit: burst,
        })
    }
}

fn clamp_u32(v: i64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
