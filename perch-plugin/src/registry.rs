use crate::plugin::{StreamPlugin, UiManifest, UnaryPlugin};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Lookup of streaming plugins by id.
pub trait StreamRegistry: Send + Sync {
    fn get(&self, plugin_id: &str) -> Option<Arc<StreamPlugin>>;
    fn len(&self) -> usize;
}

/// Lookup of unary plugins by id.
pub trait UnaryRegistry: Send + Sync {
    fn get(&self, plugin_id: &str) -> Option<Arc<UnaryPlugin>>;
    fn len(&self) -> usize;
}

/// Lookup of UI manifests by id.
pub trait UiRegistry: Send + Sync {
    fn get(&self, plugin_id: &str) -> Option<Arc<UiManifest>>;
    fn all(&self) -> Vec<Arc<UiManifest>>;
}

/// In-memory streaming registry.
///
/// Readers get an `Arc` snapshot; a reload swaps the whole entry so a
/// request in flight keeps the route table it started with.
#[derive(Clone, Default)]
pub struct MemoryStreamRegistry {
    plugins: Arc<DashMap<String, Arc<StreamPlugin>>>,
}

impl MemoryStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a plugin.
    pub fn insert(&self, plugin: StreamPlugin) {
        let id = plugin.info.id.clone();
        info!(plugin = %id, routes = plugin.info.routes.len(), "Registered streaming plugin");
        self.plugins.insert(id, Arc::new(plugin));
    }

    pub fn remove(&self, plugin_id: &str) -> bool {
        self.plugins.remove(plugin_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl StreamRegistry for MemoryStreamRegistry {
    fn get(&self, plugin_id: &str) -> Option<Arc<StreamPlugin>> {
        self.plugins.get(plugin_id).map(|e| Arc::clone(e.value()))
    }

    fn len(&self) -> usize {
        self.plugins.len()
    }
}

/// In-memory unary registry.
#[derive(Clone, Default)]
pub struct MemoryUnaryRegistry {
    plugins: Arc<DashMap<String, Arc<UnaryPlugin>>>,
}

impl MemoryUnaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plugin: UnaryPlugin) {
        let id = plugin.info.id.clone();
        info!(
            plugin = %id,
            routes = plugin.info.routes.len(),
            online = plugin.online,
            "Registered unary plugin"
        );
        self.plugins.insert(id, Arc::new(plugin));
    }

    pub fn remove(&self, plugin_id: &str) -> bool {
        self.plugins.remove(plugin_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl UnaryRegistry for MemoryUnaryRegistry {
    fn get(&self, plugin_id: &str) -> Option<Arc<UnaryPlugin>> {
        self.plugins.get(plugin_id).map(|e| Arc::clone(e.value()))
    }

    fn len(&self) -> usize {
        self.plugins.len()
    }
}

/// In-memory UI manifest registry.
#[derive(Clone, Default)]
pub struct MemoryUiRegistry {
    manifests: Arc<DashMap<String, Arc<UiManifest>>>,
}

impl MemoryUiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, manifest: UiManifest) {
        self.manifests
            .insert(manifest.plugin_id.clone(), Arc::new(manifest));
    }

    pub fn remove(&self, plugin_id: &str) -> bool {
        self.manifests.remove(plugin_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl UiRegistry for MemoryUiRegistry {
    fn get(&self, plugin_id: &str) -> Option<Arc<UiManifest>> {
        self.manifests.get(plugin_id).map(|e| Arc::clone(e.value()))
    }

    /// All manifests, ordered by plugin id.
    fn all(&self) -> Vec<Arc<UiManifest>> {
        let mut all: Vec<_> = self.manifests.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        all
    }
}
