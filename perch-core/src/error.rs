use crate::message::ProxyResponse;
use serde_json::json;
use thiserror::Error;

/// Unified error type for the dispatch layer.
///
/// Every variant maps to a structured `{success:false, error}` response;
/// nothing here is allowed to escape as a panic or a bare 500.
#[derive(Error, Debug)]
pub enum PerchError {
    #[error("Rate limit exceeded")]
    QuotaExceeded { retry_after: u64 },

    #[error("route not found")]
    RouteNotFound,

    #[error("plugin not found")]
    PluginNotFound,

    #[error("plugin error: {0}")]
    Upstream(String),

    #[error("plugin bundle not found")]
    BundleNotFound,

    #[error("bundle not embedded")]
    BundleNotEmbedded,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PerchError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            PerchError::QuotaExceeded { .. } => 429,
            PerchError::RouteNotFound => 404,
            PerchError::PluginNotFound => 404,
            PerchError::Upstream(_) => 502,
            PerchError::BundleNotFound | PerchError::BundleNotEmbedded => 404,
            _ => 500,
        }
    }

    /// Render as an enveloped JSON response.
    pub fn to_response(&self) -> ProxyResponse {
        let status = self.status_code();
        match self {
            PerchError::QuotaExceeded { retry_after } => ProxyResponse::failure(
                status,
                json!({
                    "code": status,
                    "message": self.to_string(),
                    "retry_after": retry_after,
                }),
            )
            .with_header("Retry-After", retry_after.to_string()),
            _ => ProxyResponse::failure(status, self.to_string()),
        }
    }
}
