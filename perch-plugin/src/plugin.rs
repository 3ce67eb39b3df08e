use async_trait::async_trait;
use bytes::Bytes;
use perch_core::message::{ProxyRequest, ProxyResponse};
use perch_core::route::RouteSpec;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a plugin is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// One call per request (HTTP, RPC).
    Unary,
    /// Persistent bidirectional channel multiplexing requests.
    Streaming,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Unary => "unary",
            Transport::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure talking to a plugin backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    Transport(String),

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("plugin stream closed")]
    Closed,

    #[error("plugin task panicked")]
    Panicked,
}

/// Metadata a plugin declares when it registers.
#[derive(Debug, Clone, Default)]
pub struct PluginInfo {
    pub id: String,
    pub routes: Vec<RouteSpec>,
}

impl PluginInfo {
    /// Routes are stamped with the owning plugin id.
    pub fn new(id: impl Into<String>, routes: Vec<RouteSpec>) -> Self {
        let id = id.into();
        let routes = routes
            .into_iter()
            .map(|mut r| {
                r.plugin_id.clone_from(&id);
                r
            })
            .collect();
        Self { id, routes }
    }
}

/// The host side of a streaming plugin connection.
#[async_trait]
pub trait StreamSession: Send + Sync {
    /// Send one request over the stream. `Ok(None)` means the plugin is
    /// reachable but does not recognise the route.
    async fn send_http(&self, req: ProxyRequest) -> Result<Option<ProxyResponse>, BackendError>;
}

/// Client for a plugin invoked once per request.
#[async_trait]
pub trait UnaryClient: Send + Sync {
    async fn on_http(&self, req: ProxyRequest) -> Result<ProxyResponse, BackendError>;
}

/// Registry entry for a streaming plugin.
pub struct StreamPlugin {
    pub info: PluginInfo,
    pub session: Arc<dyn StreamSession>,
}

impl StreamPlugin {
    pub fn new(info: PluginInfo, session: Arc<dyn StreamSession>) -> Self {
        Self { info, session }
    }

    pub async fn send_http(&self, req: ProxyRequest) -> Result<Option<ProxyResponse>, BackendError> {
        self.session.send_http(req).await
    }
}

/// Registry entry for a unary plugin.
pub struct UnaryPlugin {
    pub online: bool,
    pub info: PluginInfo,
    pub client: Arc<dyn UnaryClient>,
}

impl UnaryPlugin {
    pub fn new(info: PluginInfo, client: Arc<dyn UnaryClient>) -> Self {
        Self {
            online: true,
            info,
            client,
        }
    }

    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub async fn invoke(&self, req: ProxyRequest) -> Result<ProxyResponse, BackendError> {
        self.client.on_http(req).await
    }
}

/// UI manifest published by a plugin.
///
/// The bundle bytes are served separately and never serialized into the
/// manifest listing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UiManifest {
    pub plugin_id: String,
    pub name: String,
    pub version: String,
    pub has_bundle: bool,
    #[serde(skip)]
    pub bundle_data: Bytes,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UiManifest {
    pub fn new(plugin_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_bundle(mut self, data: impl Into<Bytes>) -> Self {
        self.has_bundle = true;
        self.bundle_data = data.into();
        self
    }
}
