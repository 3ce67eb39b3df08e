pub mod config;
pub mod error;
pub mod matcher;
pub mod message;
pub mod route;

pub use config::PerchConfig;
pub use error::PerchError;
pub use message::{ProxyRequest, ProxyResponse};
pub use route::{Quota, RateLimitPolicy, RouteSpec};
