//! Plugin UI manifests and JS bundles.
//!
//! Both answers are always fetched fresh; every response carries
//! cache-disabling headers so a reloaded plugin is picked up immediately.

use perch_core::error::PerchError;
use perch_core::message::ProxyResponse;
use perch_plugin::registry::UiRegistry;
use serde_json::json;
use std::sync::Arc;

const NO_CACHE: [(&str, &str); 3] = [
    ("Cache-Control", "no-store, no-cache, must-revalidate, max-age=0"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

#[derive(Clone)]
pub struct UiAssets {
    registry: Arc<dyn UiRegistry>,
}

impl UiAssets {
    pub fn new(registry: Arc<dyn UiRegistry>) -> Self {
        Self { registry }
    }

    /// `{success:true, data:{plugins:[...]}}`, 200 even when empty.
    pub fn list_manifests(&self) -> ProxyResponse {
        let plugins: Vec<_> = self.registry.all();
        let manifests: Vec<_> = plugins.iter().map(|m| m.as_ref()).collect();
        no_cache(ProxyResponse::success(200, json!({ "plugins": manifests })))
    }

    pub fn serve_bundle(&self, plugin_id: &str) -> ProxyResponse {
        let manifest = match self.registry.get(plugin_id) {
            Some(m) if m.has_bundle => m,
            _ => return PerchError::BundleNotFound.to_response(),
        };
        if manifest.bundle_data.is_empty() {
            return PerchError::BundleNotEmbedded.to_response();
        }
        no_cache(
            ProxyResponse::new(200)
                .with_header("Content-Type", "application/javascript")
                .with_body(manifest.bundle_data.clone()),
        )
    }
}

fn no_cache(mut resp: ProxyResponse) -> ProxyResponse {
    for (name, value) in NO_CACHE {
        resp.set_header(name, value);
    }
    resp
}
