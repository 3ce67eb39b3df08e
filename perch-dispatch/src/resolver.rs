use perch_core::route::RouteSpec;
use perch_plugin::registry::{StreamRegistry, UnaryRegistry};
use std::sync::Arc;

/// Finds the route a request falls under, for its rate-limit policy.
///
/// Streaming routes are searched before unary routes; within one table the
/// first declared match wins.
#[derive(Clone)]
pub struct RouteResolver {
    streaming: Arc<dyn StreamRegistry>,
    unary: Arc<dyn UnaryRegistry>,
}

impl RouteResolver {
    pub fn new(streaming: Arc<dyn StreamRegistry>, unary: Arc<dyn UnaryRegistry>) -> Self {
        Self { streaming, unary }
    }

    pub fn resolve(&self, plugin_id: &str, method: &str, path: &str) -> Option<RouteSpec> {
        if let Some(plugin) = self.streaming.get(plugin_id)
            && let Some(route) = find_route(&plugin.info.routes, method, path)
        {
            return Some(route.clone());
        }
        if let Some(plugin) = self.unary.get(plugin_id)
            && let Some(route) = find_route(&plugin.info.routes, method, path)
        {
            return Some(route.clone());
        }
        None
    }
}

/// First route in `routes` matching `method` and `path`.
pub fn find_route<'a>(routes: &'a [RouteSpec], method: &str, path: &str) -> Option<&'a RouteSpec> {
    routes.iter().find(|r| r.matches(method, path))
}
