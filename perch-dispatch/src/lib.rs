pub mod backend;
pub mod dispatcher;
pub mod key;
pub mod resolver;
pub mod ui;

pub use backend::{BackendSelector, PluginHandle, Registries};
pub use dispatcher::{DispatchSettings, Dispatcher, InboundRequest};
pub use resolver::RouteResolver;
pub use ui::UiAssets;
