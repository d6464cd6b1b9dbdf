//! Container inventory over the Docker control API.
//!
//! Discovery is a two-stage fetch: one `list containers` call for identity,
//! names and port mappings, then one `inspect` call per container for the
//! per-network IP addresses. The list call is fatal on failure; a failed
//! inspect only degrades that single record.

use std::collections::HashMap;

use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::SocketClient;

/// One port mapping as reported by the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PortMapping {
    /// Host-facing IP, often empty.
    #[serde(rename = "IP", default)]
    pub ip: String,
    /// Published host port, 0 when the port is not published.
    #[serde(rename = "PublicPort", default)]
    pub public_port: u32,
    /// Container-facing port.
    #[serde(rename = "PrivatePort", default)]
    pub private_port: u32,
    /// Transport protocol, e.g. "tcp" or "udp". Compared case-insensitively.
    #[serde(rename = "Type", default)]
    pub protocol: String,
}

/// Summary object from `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id", default)]
    pub id: String,
    /// Name aliases; Docker reports these with a leading slash.
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Ports", default)]
    pub ports: Vec<PortMapping>,
}

/// Network IPs for one container, distinguishing a successful inspect from a
/// failed one so downstream stages can tell "no networks" apart from "no
/// information".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkInfo {
    /// Inspect succeeded; map of network name to assigned IP address. The map
    /// may be empty and individual addresses may be empty strings.
    Attached(HashMap<String, String>),
    /// Inspect failed; nothing is known about this container's networks.
    Unavailable,
}

impl NetworkInfo {
    /// Whether the container has an entry for `network`, regardless of the
    /// address value.
    pub fn has(&self, network: &str) -> bool {
        match self {
            NetworkInfo::Attached(map) => map.contains_key(network),
            NetworkInfo::Unavailable => false,
        }
    }

    /// The address assigned on `network`, if any.
    pub fn address_on(&self, network: &str) -> Option<&str> {
        match self {
            NetworkInfo::Attached(map) => map.get(network).map(String::as_str),
            NetworkInfo::Unavailable => None,
        }
    }
}

/// Normalized view of one container, merged from list and inspect results.
///
/// Records are built fresh on every discovery cycle and discarded with it;
/// no identity persists across cycles.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub names: Vec<String>,
    pub networks: NetworkInfo,
    pub ports: Vec<PortMapping>,
}

/// Read-only slice of the container control API used by discovery.
///
/// Behind a trait so the pipeline can run against a mock in tests.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Lists all containers, including stopped ones.
    async fn list_containers(&self, cancel: &CancellationToken) -> Result<Vec<ContainerSummary>>;

    /// Returns the network-name → IP-address map for one container.
    async fn inspect_container(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>>;
}

/// [`ControlApi`] implementation against the Docker daemon socket.
#[derive(Debug, Clone)]
pub struct DockerApi {
    client: SocketClient,
}

#[derive(Debug, Deserialize)]
struct ContainerDetail {
    #[serde(rename = "NetworkSettings", default)]
    network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkSettings {
    #[serde(rename = "Networks", default)]
    networks: HashMap<String, EndpointSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl DockerApi {
    pub fn new(client: SocketClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ControlApi for DockerApi {
    async fn list_containers(&self, cancel: &CancellationToken) -> Result<Vec<ContainerSummary>> {
        let body = self.client.get("/containers/json?all=1", cancel).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn inspect_container(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        let body = self
            .client
            .get(&format!("/containers/{}/json", id), cancel)
            .await?;
        let detail: ContainerDetail = serde_json::from_slice(&body)?;
        let networks = detail
            .network_settings
            .map(|s| s.networks)
            .unwrap_or_default();
        Ok(networks
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address))
            .collect())
    }
}

/// Fetches the full container inventory in list order.
///
/// A list failure aborts the fetch. A failed inspect is logged and leaves
/// that one record with [`NetworkInfo::Unavailable`]; the batch continues.
/// Cancellation propagates immediately.
pub async fn fetch_inventory(
    api: &dyn ControlApi,
    cancel: &CancellationToken,
) -> Result<Vec<ContainerRecord>> {
    let summaries = api.list_containers(cancel).await?;

    let mut records = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let networks = match api.inspect_container(&summary.id, cancel).await {
            Ok(map) => NetworkInfo::Attached(map),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("failed to inspect container {}: {}", summary.id, e);
                NetworkInfo::Unavailable
            }
        };
        records.push(ContainerRecord {
            id: summary.id,
            names: summary.names,
            networks,
            ports: summary.ports,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_body_decodes_summary_fields() {
        let body = r#"[
            {
                "Id": "abcdef012345ff00",
                "Names": ["/metube_app_proxy_1"],
                "Image": "proxy:latest",
                "State": "running",
                "Ports": [
                    {"IP": "0.0.0.0", "PrivatePort": 8080, "PublicPort": 32768, "Type": "tcp"},
                    {"PrivatePort": 53, "Type": "udp"}
                ]
            },
            {"Id": "00ff", "Names": []}
        ]"#;
        let summaries: Vec<ContainerSummary> = serde_json::from_str(body).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "abcdef012345ff00");
        assert_eq!(summaries[0].names, vec!["/metube_app_proxy_1"]);
        assert_eq!(summaries[0].ports.len(), 2);
        assert_eq!(summaries[0].ports[0].private_port, 8080);
        assert_eq!(summaries[0].ports[0].public_port, 32768);
        assert_eq!(summaries[0].ports[1].public_port, 0);
        assert_eq!(summaries[0].ports[1].protocol, "udp");
        assert!(summaries[1].ports.is_empty());
    }

    #[test]
    fn inspect_body_flattens_to_network_map() {
        let body = r#"{
            "Id": "abcdef012345ff00",
            "NetworkSettings": {
                "Networks": {
                    "umbrel_main_network": {"IPAddress": "10.0.0.5", "Gateway": "10.0.0.1"},
                    "bridge": {"IPAddress": ""}
                }
            }
        }"#;
        let detail: ContainerDetail = serde_json::from_str(body).unwrap();
        let networks = detail.network_settings.unwrap().networks;
        assert_eq!(networks["umbrel_main_network"].ip_address, "10.0.0.5");
        assert_eq!(networks["bridge"].ip_address, "");
    }

    #[test]
    fn inspect_body_without_networks_is_empty() {
        let detail: ContainerDetail = serde_json::from_str("{}").unwrap();
        assert!(detail.network_settings.is_none());
    }

    #[test]
    fn network_info_distinguishes_missing_from_unavailable() {
        let attached = NetworkInfo::Attached(HashMap::from([(
            "net".to_string(),
            "10.0.0.5".to_string(),
        )]));
        assert!(attached.has("net"));
        assert_eq!(attached.address_on("net"), Some("10.0.0.5"));
        assert!(!attached.has("other"));

        let unavailable = NetworkInfo::Unavailable;
        assert!(!unavailable.has("net"));
        assert_eq!(unavailable.address_on("net"), None);
    }
}
