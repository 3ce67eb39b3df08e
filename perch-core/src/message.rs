use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Request handed to a plugin backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyRequest {
    pub method: String,
    /// Path relative to the plugin mount, always starting with `/`.
    pub path: String,
    /// Flattened headers; the last value wins on duplicates.
    pub headers: HashMap<String, String>,
    /// Flattened query parameters; the last value wins on duplicates.
    pub query: HashMap<String, String>,
    pub body: Bytes,
    /// Authenticated user id, empty for anonymous requests.
    pub user_id: String,
}

impl ProxyRequest {
    pub fn new(method: impl Into<String>, path: &str) -> Self {
        Self {
            method: method.into(),
            path: normalize_path(path),
            ..Self::default()
        }
    }

    pub fn with_headers<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = flatten(pairs);
        self
    }

    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query = flatten(pairs);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id.unwrap_or_default();
        self
    }
}

/// Ensure a plugin-relative path starts with `/`; empty becomes `/`.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Collapse multi-valued pairs into a map, keeping the last value.
pub fn flatten<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut map = HashMap::new();
    for (k, v) in pairs {
        map.insert(k.into(), v.into());
    }
    map
}

/// Response produced by a plugin backend, or by the dispatch layer itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// `{success:true, data}` envelope.
    pub fn success(status: u16, data: Value) -> Self {
        Self::json(status, &json!({ "success": true, "data": data }))
    }

    /// `{success:false, error}` envelope; `error` is a string or an object.
    pub fn failure(status: u16, error: impl Into<Value>) -> Self {
        Self::json(status, &json!({ "success": false, "error": error.into() }))
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body.to_string())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing any existing one with the same name
    /// regardless of case.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_normalizes_to_root() {
        assert_eq!(ProxyRequest::new("GET", "").path, "/");
        assert_eq!(ProxyRequest::new("GET", "status").path, "/status");
        assert_eq!(ProxyRequest::new("GET", "/status").path, "/status");
    }

    #[test]
    fn duplicate_pairs_keep_last_value() {
        let req = ProxyRequest::new("GET", "/")
            .with_headers([("x-tag", "a"), ("x-tag", "b")])
            .with_query([("page", "1"), ("page", "2"), ("size", "10")]);
        assert_eq!(req.headers["x-tag"], "b");
        assert_eq!(req.query["page"], "2");
        assert_eq!(req.query["size"], "10");
    }

    #[test]
    fn missing_user_becomes_empty_string() {
        let req = ProxyRequest::new("GET", "/").with_user(None);
        assert_eq!(req.user_id, "");
        let req = ProxyRequest::new("GET", "/").with_user(Some("u-1".into()));
        assert_eq!(req.user_id, "u-1");
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut resp = ProxyResponse::new(200).with_header("X-RateLimit-Limit", "60");
        resp.set_header("x-ratelimit-limit", "10");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("X-RATELIMIT-LIMIT"), Some("10"));
    }

    #[test]
    fn failure_envelope_shape() {
        let resp = ProxyResponse::failure(404, "plugin not found");
        assert_eq!(resp.status, 404);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body, json!({ "success": false, "error": "plugin not found" }));
    }

    #[test]
    fn success_envelope_shape() {
        let resp = ProxyResponse::success(200, json!({ "plugins": [] }));
        let body: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["success"], true);
        assert!(body["data"]["plugins"].as_array().unwrap().is_empty());
    }
}
