//! Builds a configuration snapshot from the eligible containers.
//!
//! Every skip here is silent and per-record: a container without a valid
//! IPv4 address on the routing network, or without a TCP private port, simply
//! contributes nothing to the snapshot. Missing routing for a container is
//! the documented degraded outcome, not an error.

use std::net::Ipv4Addr;

use log::debug;

use crate::docker::ContainerRecord;
use crate::traefik::{DynamicConfiguration, LoadBalancer, Router, Server, Service};

const SERVICE_NAME_PREFIX: &str = "umbrel-service-";
const ROUTER_NAME_PREFIX: &str = "umbrel-router-";

/// Chars of the container ID used in service and router names. Docker IDs are
/// hex, so a 12-char prefix follows the CLI's short-ID convention.
const SHORT_ID_LEN: usize = 12;

/// Derives the subdomain label for a container from one of its name aliases.
///
/// Returning `None` means the container gets a service but no router.
pub trait NamingStrategy: Send + Sync {
    fn label(&self, alias: &str) -> Option<String>;
}

/// Default deployment convention: strip one leading slash, split on
/// underscore, take the first segment. `/metube_app_proxy_1` → `metube`.
#[derive(Debug, Clone, Default)]
pub struct SubdomainFromName;

impl NamingStrategy for SubdomainFromName {
    fn label(&self, alias: &str) -> Option<String> {
        let trimmed = alias.strip_prefix('/').unwrap_or(alias);
        let first = trimmed.split('_').next().unwrap_or_default();
        if first.is_empty() {
            None
        } else {
            Some(first.to_string())
        }
    }
}

/// Maps eligible containers to proxy services and host-rule routers.
pub struct Synthesizer {
    network_name: String,
    domain: String,
    entry_point: String,
    naming: Box<dyn NamingStrategy>,
}

impl Synthesizer {
    pub fn new(
        network_name: impl Into<String>,
        domain: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self::with_naming(network_name, domain, entry_point, Box::new(SubdomainFromName))
    }

    pub fn with_naming(
        network_name: impl Into<String>,
        domain: impl Into<String>,
        entry_point: impl Into<String>,
        naming: Box<dyn NamingStrategy>,
    ) -> Self {
        Self {
            network_name: network_name.into(),
            domain: domain.into(),
            entry_point: entry_point.into(),
            naming,
        }
    }

    /// Builds one immutable snapshot from the filtered inventory.
    ///
    /// Deterministic: the same input always yields the same snapshot. Every
    /// router emitted references a service emitted in the same call.
    pub fn synthesize(&self, records: &[ContainerRecord]) -> DynamicConfiguration {
        let mut config = DynamicConfiguration::default();

        for record in records {
            let Some(address) = self.ipv4_address(record) else {
                debug!("skipping {}: no IPv4 on {}", record.id, self.network_name);
                continue;
            };
            let Some(port) = first_tcp_private_port(record) else {
                debug!("skipping {}: no TCP private port", record.id);
                continue;
            };

            let short = short_id(&record.id);
            let service_name = format!("{}{}", SERVICE_NAME_PREFIX, short);
            let url = format!("http://{}:{}", address, port);

            config.http.services.insert(
                service_name.clone(),
                Service {
                    load_balancer: LoadBalancer {
                        servers: vec![Server { url }],
                        pass_host_header: Some(true),
                    },
                },
            );

            // No usable alias means the service stands alone without a router.
            let label = record
                .names
                .first()
                .and_then(|alias| self.naming.label(alias));
            if let Some(label) = label {
                config.http.routers.insert(
                    format!("{}{}", ROUTER_NAME_PREFIX, short),
                    Router {
                        entry_points: vec![self.entry_point.clone()],
                        service: service_name,
                        rule: format!("Host(`{}.{}`)", label, self.domain),
                    },
                );
            }
        }

        config
    }

    /// IPv6-only addresses are not supported routing targets.
    fn ipv4_address<'a>(&self, record: &'a ContainerRecord) -> Option<&'a str> {
        let address = record.networks.address_on(&self.network_name)?;
        if address.is_empty() || address.parse::<Ipv4Addr>().is_err() {
            return None;
        }
        Some(address)
    }
}

fn first_tcp_private_port(record: &ContainerRecord) -> Option<u32> {
    record
        .ports
        .iter()
        .find(|p| p.private_port > 0 && p.protocol.eq_ignore_ascii_case("tcp"))
        .map(|p| p.private_port)
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{NetworkInfo, PortMapping};
    use std::collections::HashMap;

    const NETWORK: &str = "umbrel_main_network";

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(NETWORK, "umbrel.simonhaas.eu", "websecure")
    }

    fn tcp_port(private: u32) -> PortMapping {
        PortMapping {
            private_port: private,
            protocol: "tcp".to_string(),
            ..Default::default()
        }
    }

    fn record(id: &str, names: &[&str], address: &str, ports: Vec<PortMapping>) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
            networks: NetworkInfo::Attached(HashMap::from([(
                NETWORK.to_string(),
                address.to_string(),
            )])),
            ports,
        }
    }

    #[test]
    fn emits_service_and_router_for_eligible_record() {
        let records = vec![record(
            "abcdef012345ff",
            &["/metube_app_proxy_1"],
            "10.0.0.5",
            vec![tcp_port(8080)],
        )];
        let config = synthesizer().synthesize(&records);

        let service = &config.http.services["umbrel-service-abcdef012345"];
        assert_eq!(service.load_balancer.servers[0].url, "http://10.0.0.5:8080");
        assert_eq!(service.load_balancer.pass_host_header, Some(true));

        let router = &config.http.routers["umbrel-router-abcdef012345"];
        assert_eq!(router.service, "umbrel-service-abcdef012345");
        assert_eq!(router.rule, "Host(`metube.umbrel.simonhaas.eu`)");
        assert_eq!(router.entry_points, vec!["websecure"]);
    }

    #[test]
    fn every_router_references_an_emitted_service() {
        let records = vec![
            record("a".repeat(16).as_str(), &["/one_x"], "10.0.0.2", vec![tcp_port(80)]),
            record("b".repeat(16).as_str(), &["/two_x"], "10.0.0.3", vec![tcp_port(81)]),
        ];
        let config = synthesizer().synthesize(&records);
        for router in config.http.routers.values() {
            assert!(config.http.services.contains_key(&router.service));
        }
    }

    #[test]
    fn invalid_ipv4_is_skipped() {
        for address in ["", "not-an-ip", "fd00::5", "10.0.0.300"] {
            let records = vec![record(
                "abcdef012345ff",
                &["/x_1"],
                address,
                vec![tcp_port(80)],
            )];
            let config = synthesizer().synthesize(&records);
            assert!(config.http.services.is_empty(), "address {:?}", address);
            assert!(config.http.routers.is_empty());
        }
    }

    #[test]
    fn record_without_tcp_private_port_is_skipped() {
        let udp_only = PortMapping {
            private_port: 53,
            protocol: "udp".to_string(),
            ..Default::default()
        };
        let records = vec![record("abcdef012345ff", &["/x_1"], "10.0.0.5", vec![udp_only])];
        let config = synthesizer().synthesize(&records);
        assert!(config.http.services.is_empty());
        assert!(config.http.routers.is_empty());
    }

    #[test]
    fn first_eligible_tcp_port_wins() {
        let ports = vec![
            PortMapping {
                private_port: 0,
                protocol: "tcp".to_string(),
                ..Default::default()
            },
            PortMapping {
                private_port: 53,
                protocol: "udp".to_string(),
                ..Default::default()
            },
            tcp_port(8080),
            tcp_port(9090),
        ];
        let records = vec![record("abcdef012345ff", &["/x_1"], "10.0.0.5", ports)];
        let config = synthesizer().synthesize(&records);
        let service = &config.http.services["umbrel-service-abcdef012345"];
        assert_eq!(service.load_balancer.servers[0].url, "http://10.0.0.5:8080");
    }

    #[test]
    fn protocol_comparison_is_case_insensitive() {
        let ports = vec![PortMapping {
            private_port: 8080,
            protocol: "TCP".to_string(),
            ..Default::default()
        }];
        let records = vec![record("abcdef012345ff", &["/x_1"], "10.0.0.5", ports)];
        let config = synthesizer().synthesize(&records);
        assert_eq!(config.http.services.len(), 1);
    }

    #[test]
    fn nameless_record_gets_service_but_no_router() {
        let records = vec![record("abcdef012345ff", &[], "10.0.0.5", vec![tcp_port(80)])];
        let config = synthesizer().synthesize(&records);
        assert_eq!(config.http.services.len(), 1);
        assert!(config.http.routers.is_empty());
    }

    #[test]
    fn synthesis_is_byte_identical_on_same_input() {
        let records = vec![
            record("abcdef012345ff", &["/metube_app_proxy_1"], "10.0.0.5", vec![tcp_port(8080)]),
            record("0123456789abcdef", &["/pihole_app_proxy_1"], "10.0.0.6", vec![tcp_port(80)]),
        ];
        let synth = synthesizer();
        let first = serde_json::to_vec(&synth.synthesize(&records)).unwrap();
        let second = serde_json::to_vec(&synth.synthesize(&records)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn subdomain_naming_strips_slash_and_splits_on_underscore() {
        let naming = SubdomainFromName;
        assert_eq!(naming.label("/metube_app_proxy_1").as_deref(), Some("metube"));
        assert_eq!(naming.label("plain").as_deref(), Some("plain"));
        assert_eq!(naming.label("/_app_proxy_1"), None);
        assert_eq!(naming.label("/"), None);
        assert_eq!(naming.label(""), None);
    }

    #[test]
    fn short_ids_truncate_but_tolerate_short_input() {
        assert_eq!(short_id("abcdef012345ff"), "abcdef012345");
        assert_eq!(short_id("abc"), "abc");
    }
}
