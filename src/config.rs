//! portcullis/src/config.rs
//! Proxy configuration.

use serde::{Deserialize, Serialize};

/// Addresses the proxy operates between.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// TCP address to listen on for game clients.
    pub listen_addr: String,
    /// TCP address of the upstream game server.
    pub upstream_addr: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:25565".to_string(),
            upstream_addr: "127.0.0.1:25566".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: ProxyConfig = serde_json::from_str(r#"{"listenAddr":"0.0.0.0:7777"}"#).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:7777");
        assert_eq!(config.upstream_addr, "127.0.0.1:25566");
    }
}
