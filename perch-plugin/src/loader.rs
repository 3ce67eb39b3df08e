//! Startup loading of plugins declared in the config file.

use crate::http::HttpUnaryClient;
use crate::plugin::{PluginInfo, UiManifest, UnaryPlugin};
use crate::registry::{MemoryUiRegistry, MemoryUnaryRegistry};
use perch_core::config::{PluginDecl, UiDecl};
use std::sync::Arc;
use tracing::{info, warn};

/// Register every declared plugin and its UI manifest.
///
/// Returns the number of plugins registered. An unreadable bundle file
/// leaves the manifest with an empty payload rather than failing startup.
pub fn load_declared(
    decls: &[PluginDecl],
    unary: &MemoryUnaryRegistry,
    ui: &MemoryUiRegistry,
) -> usize {
    let client = reqwest::Client::new();

    for decl in decls {
        let info = PluginInfo::new(decl.id.clone(), decl.routes.clone());
        let http = HttpUnaryClient::with_client(decl.url.clone(), client.clone());
        let mut plugin = UnaryPlugin::new(info, Arc::new(http));
        plugin.online = decl.online;
        unary.insert(plugin);

        if let Some(ui_decl) = &decl.ui {
            ui.insert(manifest_for(&decl.id, ui_decl));
        }
    }

    info!(plugins = decls.len(), manifests = ui.len(), "Declared plugins loaded");
    decls.len()
}

fn manifest_for(plugin_id: &str, decl: &UiDecl) -> UiManifest {
    let mut manifest = UiManifest::new(plugin_id, decl.name.clone().unwrap_or_else(|| plugin_id.to_string()));
    manifest.version = decl.version.clone();
    manifest.extra = decl.extra.clone();

    if let Some(path) = &decl.bundle_path {
        manifest.has_bundle = true;
        match std::fs::read(path) {
            Ok(data) => manifest.bundle_data = data.into(),
            Err(e) => {
                warn!(plugin = %plugin_id, path = %path.display(), error = %e, "UI bundle unreadable");
            }
        }
    }
    manifest
}
