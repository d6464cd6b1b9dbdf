//! DNS responder for names that encode an IP address.
//!
//! Queries whose first label is a dash-separated IPv4 address
//! (`10-0-0-5.proxy.example.org`, optionally with a literal prefix as in
//! `app-10-0-0-5.proxy.example.org`) are answered with the decoded A record;
//! a dash-encoded IPv6 label (`fe80--1.proxy.example.org`) is answered with
//! the decoded AAAA record. Anything else gets an empty answer, or is
//! forwarded to the system resolver when fallback is enabled.
//!
//! The responder is stateless per query and shares nothing with the
//! discovery pipeline; it runs only when enabled in the configuration.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, ResponseCode};
use hickory_server::proto::rr::rdata::{A, AAAA};
use hickory_server::proto::rr::{RData, Record, RecordType};
use hickory_server::server::{
    Request, RequestHandler, ResponseHandler, ResponseInfo, ServerFuture,
};
use log::{error, info, warn};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::Duration;

/// Timeout for idle TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the DNS responder on the given address.
pub async fn run_dns_server(
    bind_addr: SocketAddr,
    ttl: u32,
    fallback: bool,
) -> anyhow::Result<()> {
    info!("DNS responder starting on {}", bind_addr);

    let resolver = if fallback {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!(
                "Failed to load system resolv.conf: {}. Using default upstream.",
                e
            );
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Some(resolver)
    } else {
        None
    };

    let handler = EncodedIpHandler { ttl, resolver };
    let mut server = ServerFuture::new(handler);

    let udp = UdpSocket::bind(bind_addr).await?;
    server.register_socket(udp);

    let tcp = TcpListener::bind(bind_addr).await?;
    server.register_listener(tcp, TCP_TIMEOUT);

    server.block_until_done().await?;
    Ok(())
}

/// Answers address queries by decoding the IP embedded in the query name.
pub struct EncodedIpHandler {
    ttl: u32,
    /// Upstream forwarding for unmatched names; `None` answers them empty.
    resolver: Option<TokioAsyncResolver>,
}

impl EncodedIpHandler {
    pub fn new(ttl: u32, resolver: Option<TokioAsyncResolver>) -> Self {
        Self { ttl, resolver }
    }
}

#[async_trait]
impl RequestHandler for EncodedIpHandler {
    async fn handle_request<R>(&self, request: &Request, mut response_handle: R) -> ResponseInfo
    where
        R: ResponseHandler + Send,
    {
        let query = request.query();
        let qname = query.name().to_string().to_lowercase();
        let qtype = query.query_type();

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        let decoded = parse_dash_name(&qname);
        let record = match (decoded, qtype) {
            (Some(IpAddr::V4(ip)), RecordType::A | RecordType::ANY) => Some(Record::from_rdata(
                query.name().clone().into(),
                self.ttl,
                RData::A(A(ip)),
            )),
            (Some(IpAddr::V6(ip)), RecordType::AAAA | RecordType::ANY) => Some(
                Record::from_rdata(query.name().clone().into(), self.ttl, RData::AAAA(AAAA(ip))),
            ),
            _ => None,
        };

        if let Some(record) = record {
            let builder = MessageResponseBuilder::from_message_request(request);
            let records = [record];
            let response = builder.build(
                header,
                records.iter(),
                std::iter::empty(),
                std::iter::empty(),
                std::iter::empty(),
            );
            return send(response_handle.send_response(response).await);
        }

        if decoded.is_none() {
            if let Some(resolver) = &self.resolver {
                return self
                    .forward(request, header, &qname, qtype, resolver, response_handle)
                    .await;
            }
        }

        // Matched name with a non-address query type, or no match without
        // fallback: an empty authoritative answer either way.
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build_no_records(header);
        send(response_handle.send_response(response).await)
    }
}

impl EncodedIpHandler {
    async fn forward<R>(
        &self,
        request: &Request,
        mut header: Header,
        qname: &str,
        qtype: RecordType,
        resolver: &TokioAsyncResolver,
        mut response_handle: R,
    ) -> ResponseInfo
    where
        R: ResponseHandler + Send,
    {
        header.set_authoritative(false);
        header.set_recursion_available(true);

        match resolver.lookup_ip(qname).await {
            Ok(lookup) => {
                let mut records = Vec::new();
                for addr in lookup.iter() {
                    match (addr, qtype) {
                        (IpAddr::V4(ip), RecordType::A | RecordType::ANY) => {
                            records.push(Record::from_rdata(
                                request.query().name().clone().into(),
                                self.ttl,
                                RData::A(A(ip)),
                            ));
                        }
                        (IpAddr::V6(ip), RecordType::AAAA | RecordType::ANY) => {
                            records.push(Record::from_rdata(
                                request.query().name().clone().into(),
                                self.ttl,
                                RData::AAAA(AAAA(ip)),
                            ));
                        }
                        _ => {}
                    }
                }
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build(
                    header,
                    records.iter(),
                    std::iter::empty(),
                    std::iter::empty(),
                    std::iter::empty(),
                );
                send(response_handle.send_response(response).await)
            }
            Err(e) => {
                warn!("Fallback lookup failed for {}: {}", qname, e);
                header.set_response_code(ResponseCode::ServFail);
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build_no_records(header);
                send(response_handle.send_response(response).await)
            }
        }
    }
}

fn send(result: std::io::Result<ResponseInfo>) -> ResponseInfo {
    result.unwrap_or_else(|e| {
        error!("Failed to send DNS response: {}", e);
        let mut header = Header::new();
        header.set_response_code(ResponseCode::ServFail);
        header.into()
    })
}

/// Decodes the IP address embedded in the first label of `qname`.
///
/// The label must be followed by at least one more label (or the root dot),
/// and may carry a single literal prefix separated by a dash, e.g.
/// `app-10-0-0-5`. IPv6 labels use dashes for colons, so the usual `::`
/// shorthand appears as `--`.
pub fn parse_dash_name(qname: &str) -> Option<IpAddr> {
    let (label, _rest) = qname.split_once('.')?;
    parse_label(label)
}

fn parse_label(label: &str) -> Option<IpAddr> {
    if let Some(ip) = decode(label) {
        return Some(ip);
    }
    let (head, tail) = label.split_once('-')?;
    if !head.is_empty() && head.chars().all(|c| c.is_ascii_alphabetic()) {
        decode(tail)
    } else {
        None
    }
}

fn decode(label: &str) -> Option<IpAddr> {
    if let Some(ip) = decode_v4(label) {
        return Some(IpAddr::V4(ip));
    }
    decode_v6(label).map(IpAddr::V6)
}

fn decode_v4(label: &str) -> Option<Ipv4Addr> {
    let parts: Vec<&str> = label.split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    for part in &parts {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    parts.join(".").parse().ok()
}

fn decode_v6(label: &str) -> Option<Ipv6Addr> {
    if !label.contains('-') {
        return None;
    }
    label.replace('-', ":").parse().ok()
}
