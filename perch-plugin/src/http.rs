//! Unary transport over plain HTTP.
//!
//! The proxied request is replayed against the plugin's base URL: same
//! method, path, query, headers and body, plus the caller's identity in
//! [`USER_ID_HEADER`]. Whatever the plugin answers is relayed as-is.

use crate::plugin::{BackendError, UnaryClient};
use async_trait::async_trait;
use perch_core::message::{ProxyRequest, ProxyResponse};
use std::collections::HashMap;
use tracing::debug;

/// Header carrying the authenticated user id to the plugin.
pub const USER_ID_HEADER: &str = "x-perch-user-id";

/// Request headers that describe the inbound connection rather than the
/// request, and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct HttpUnaryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUnaryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Share one connection pool between plugins.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join `path` below the base URL one segment at a time.
    ///
    /// Segments are percent-encoded, so a decoded `?` or `#` stays part of
    /// the path. Dot segments are refused: the result never leaves the
    /// plugin's mount.
    fn url_for(&self, path: &str) -> Result<reqwest::Url, BackendError> {
        let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();
        if let Some(dot) = segments.iter().copied().find(|s| matches!(*s, "." | "..")) {
            return Err(BackendError::Transport(format!("path segment {dot:?} not allowed")));
        }

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| BackendError::Transport(format!("invalid plugin url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Transport(format!("plugin url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[async_trait]
impl UnaryClient for HttpUnaryClient {
    async fn on_http(&self, req: ProxyRequest) -> Result<ProxyResponse, BackendError> {
        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|e| BackendError::Transport(format!("invalid method: {e}")))?;
        let url = self.url_for(&req.path)?;

        debug!(url = %url, "Forwarding to unary plugin");
        let mut builder = self.client.request(method, url).query(&req.query);
        for (name, value) in &req.headers {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case(USER_ID_HEADER) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !req.user_id.is_empty() {
            builder = builder.header(USER_ID_HEADER, req.user_id.as_str());
        }

        let resp = builder
            .body(req.body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let mut headers = HashMap::with_capacity(resp.headers().len());
        for (name, value) in resp.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpUnaryClient::new("http://127.0.0.1:7000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:7000");
        assert_eq!(client.url_for("/status").unwrap().as_str(), "http://127.0.0.1:7000/status");
        assert_eq!(client.url_for("/").unwrap().as_str(), "http://127.0.0.1:7000/");
    }

    #[test]
    fn path_stays_below_mount() {
        let client = HttpUnaryClient::new("http://host/plugins/stats");
        assert_eq!(
            client.url_for("/a?injected=1#frag/b").unwrap().as_str(),
            "http://host/plugins/stats/a%3Finjected=1%23frag/b"
        );
        assert_eq!(client.url_for("/").unwrap().as_str(), "http://host/plugins/stats/");
        for escape in ["/../../admin", "/a/./b", "/a/.."] {
            assert!(matches!(client.url_for(escape), Err(BackendError::Transport(_))), "{escape}");
        }
    }

    #[test]
    fn hop_by_hop_detection_ignores_case() {
        assert!(is_hop_by_hop("Host"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(!is_hop_by_hop("Authorization"));
    }

    #[tokio::test]
    async fn invalid_method_is_transport_error() {
        let client = HttpUnaryClient::new("http://127.0.0.1:1");
        let err = client
            .on_http(ProxyRequest::new("BAD METHOD", "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Port 1 is never listening in test environments
        let client = HttpUnaryClient::new("http://127.0.0.1:1");
        let err = client.on_http(ProxyRequest::new("GET", "/")).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
