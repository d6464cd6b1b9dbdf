use std::net::SocketAddr;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path to the container control socket. Unset means the runtime default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Network a container must be attached to in order to be routed.
    pub network_name: String,
    /// Suffix a container name alias must carry in order to be routed.
    pub name_suffix: String,
    /// Domain under which subdomain host rules are generated.
    pub domain: String,
    /// Entry point referenced by generated routers.
    pub entry_point: String,
    /// Seconds between discovery cycles.
    pub poll_interval_secs: u64,
    /// Whether to run the name-encoded-IP DNS responder.
    pub dns_enabled: bool,
    pub dns_bind: SocketAddr,
    /// TTL for synthesized address records.
    pub dns_ttl: u32,
    /// Forward unmatched queries to the system resolver instead of answering
    /// with an empty response.
    pub dns_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: None,
            network_name: "umbrel_main_network".into(),
            name_suffix: "_app_proxy_1".into(),
            domain: "umbrel.simonhaas.eu".into(),
            entry_point: "websecure".into(),
            poll_interval_secs: 10,
            dns_enabled: false,
            dns_bind: "0.0.0.0:5353".parse().expect("static bind address"),
            dns_ttl: 300,
            dns_fallback: false,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("gangway.toml"))
            .merge(Json::file("gangway.json"))
            .merge(Env::prefixed("GANGWAY_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than 0");
        }
        if config.network_name.is_empty() {
            anyhow::bail!("network_name must not be empty");
        }
        if config.domain.is_empty() {
            anyhow::bail!("domain must not be empty");
        }

        Ok(config)
    }
}
