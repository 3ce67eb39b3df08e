pub mod http;
pub mod loader;
pub mod plugin;
pub mod registry;
pub mod stream;

pub use plugin::{BackendError, PluginInfo, StreamPlugin, StreamSession, Transport, UiManifest, UnaryClient, UnaryPlugin};
pub use registry::{
    MemoryStreamRegistry, MemoryUiRegistry, MemoryUnaryRegistry, StreamRegistry, UiRegistry,
    UnaryRegistry,
};
