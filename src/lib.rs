//! Container discovery and reverse-proxy configuration synthesis.
//!
//! The daemon polls the Docker control socket, filters the containers that
//! belong to the routed network and naming convention, and turns each one
//! into a Traefik service plus a host-rule router. Each discovery cycle
//! publishes one complete [`traefik::DynamicConfiguration`] snapshot; the
//! consumer replaces the previous snapshot wholesale.
//!
//! An optional DNS responder ([`dns`]) answers queries whose name encodes an
//! IP address. It is independent of the discovery pipeline.

pub mod config;
pub mod dns;
pub mod docker;
pub mod error;
pub mod filter;
pub mod provider;
pub mod synth;
pub mod traefik;
pub mod transport;

pub use error::{Error, Result};
