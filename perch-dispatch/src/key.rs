//! Rate-limit key derivation.

use ipnet::IpNet;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::IpAddr;

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_REAL_IP: &str = "x-real-ip";

/// Picks the client address used in rate-limit keys.
///
/// Forwarding headers are honoured when no trusted proxies are configured,
/// or when the transport peer is inside one of the trusted networks.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted: Vec<IpNet>,
}

impl ClientIpResolver {
    pub fn new(trusted: Vec<IpNet>) -> Self {
        Self { trusted }
    }

    pub fn resolve(&self, headers: &HashMap<String, String>, peer: Option<IpAddr>) -> String {
        if self.trusts(peer) {
            for name in [CF_CONNECTING_IP, X_REAL_IP] {
                if let Some(value) = header_ci(headers, name)
                    && !value.trim().is_empty()
                {
                    return value.trim().to_string();
                }
            }
        }
        match peer {
            Some(ip) => ip.to_string(),
            None => "unknown".to_string(),
        }
    }

    fn trusts(&self, peer: Option<IpAddr>) -> bool {
        if self.trusted.is_empty() {
            return true;
        }
        peer.is_some_and(|ip| self.trusted.iter().any(|net| net.contains(&ip)))
    }
}

fn header_ci<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// `hex(sha256("ip:method:plugin:path")[..16])`, 32 lowercase hex chars.
pub fn rate_limit_key(client_ip: &str, method: &str, plugin_id: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_ip.as_bytes());
    hasher.update(b":");
    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(plugin_id.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
