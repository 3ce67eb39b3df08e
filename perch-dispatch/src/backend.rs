use perch_core::message::{ProxyRequest, ProxyResponse};
use perch_plugin::plugin::{BackendError, StreamPlugin, Transport, UnaryPlugin};
use perch_plugin::registry::{StreamRegistry, UiRegistry, UnaryRegistry};
use std::sync::Arc;

/// The three read-only lookups the dispatch layer consults.
#[derive(Clone)]
pub struct Registries {
    pub streaming: Arc<dyn StreamRegistry>,
    pub unary: Arc<dyn UnaryRegistry>,
    pub ui: Arc<dyn UiRegistry>,
}

impl Registries {
    pub fn new(
        streaming: Arc<dyn StreamRegistry>,
        unary: Arc<dyn UnaryRegistry>,
        ui: Arc<dyn UiRegistry>,
    ) -> Self {
        Self {
            streaming,
            unary,
            ui,
        }
    }
}

#[derive(Clone)]
enum Backend {
    Streaming(Arc<StreamPlugin>),
    Unary(Arc<UnaryPlugin>),
}

/// A plugin selected for one request, whichever transport it speaks.
#[derive(Clone)]
pub struct PluginHandle {
    backend: Backend,
}

impl PluginHandle {
    pub fn transport(&self) -> Transport {
        match self.backend {
            Backend::Streaming(_) => Transport::Streaming,
            Backend::Unary(_) => Transport::Unary,
        }
    }

    /// Streaming plugins are online for as long as they are registered.
    pub fn is_online(&self) -> bool {
        match &self.backend {
            Backend::Streaming(_) => true,
            Backend::Unary(p) => p.online,
        }
    }

    pub fn id(&self) -> &str {
        match &self.backend {
            Backend::Streaming(p) => &p.info.id,
            Backend::Unary(p) => &p.info.id,
        }
    }

    /// `Ok(None)` means the plugin did not recognize the route.
    pub async fn invoke(&self, req: ProxyRequest) -> Result<Option<ProxyResponse>, BackendError> {
        match &self.backend {
            Backend::Streaming(p) => p.send_http(req).await,
            Backend::Unary(p) => p.invoke(req).await.map(Some),
        }
    }
}

/// Backend precedence: a live streaming session beats a unary registration
/// under the same id.
#[derive(Clone)]
pub struct BackendSelector {
    streaming: Arc<dyn StreamRegistry>,
    unary: Arc<dyn UnaryRegistry>,
}

impl BackendSelector {
    pub fn new(streaming: Arc<dyn StreamRegistry>, unary: Arc<dyn UnaryRegistry>) -> Self {
        Self { streaming, unary }
    }

    pub fn select(&self, plugin_id: &str) -> Option<PluginHandle> {
        if let Some(p) = self.streaming.get(plugin_id) {
            return Some(PluginHandle {
                backend: Backend::Streaming(p),
            });
        }
        self.unary.get(plugin_id).map(|p| PluginHandle {
            backend: Backend::Unary(p),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use perch_plugin::plugin::{PluginInfo, StreamSession, UnaryClient};
    use perch_plugin::registry::{MemoryStreamRegistry, MemoryUnaryRegistry};

    struct Fixed(u16);

    #[async_trait]
    impl UnaryClient for Fixed {
        async fn on_http(&self, _req: ProxyRequest) -> Result<ProxyResponse, BackendError> {
            Ok(ProxyResponse::new(self.0))
        }
    }

    #[async_trait]
    impl StreamSession for Fixed {
        async fn send_http(&self, _req: ProxyRequest) -> Result<Option<ProxyResponse>, BackendError> {
            Ok(Some(ProxyResponse::new(self.0)))
        }
    }

    fn registries() -> (MemoryStreamRegistry, MemoryUnaryRegistry, BackendSelector) {
        let s = MemoryStreamRegistry::new();
        let u = MemoryUnaryRegistry::new();
        let selector = BackendSelector::new(Arc::new(s.clone()), Arc::new(u.clone()));
        (s, u, selector)
    }

    #[tokio::test]
    async fn streaming_takes_precedence() {
        let (s, u, selector) = registries();
        u.insert(UnaryPlugin::new(PluginInfo::new("p", vec![]), Arc::new(Fixed(200))));
        s.insert(StreamPlugin::new(PluginInfo::new("p", vec![]), Arc::new(Fixed(202))));

        let handle = selector.select("p").unwrap();
        assert_eq!(handle.transport(), Transport::Streaming);
        let resp = handle.invoke(ProxyRequest::new("GET", "/")).await.unwrap().unwrap();
        assert_eq!(resp.status, 202);
    }

    #[tokio::test]
    async fn unary_used_without_session() {
        let (_s, u, selector) = registries();
        u.insert(UnaryPlugin::new(PluginInfo::new("p", vec![]), Arc::new(Fixed(200))).offline());

        let handle = selector.select("p").unwrap();
        assert_eq!(handle.transport(), Transport::Unary);
        assert_eq!(handle.id(), "p");
        assert!(!handle.is_online());
        let resp = handle.invoke(ProxyRequest::new("GET", "/")).await.unwrap();
        assert_eq!(resp.map(|r| r.status), Some(200));
    }

    #[test]
    fn unknown_plugin_is_none() {
        let (_s, _u, selector) = registries();
        assert!(selector.select("nope").is_none());
    }
}
