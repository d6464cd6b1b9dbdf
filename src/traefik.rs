//! Traefik dynamic-configuration document model.
//!
//! Only the slice of the document this daemon produces: HTTP routers and
//! services with load-balancer backends. Maps are `BTreeMap` so that equal
//! inputs always serialize to byte-identical JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One complete configuration snapshot, superseding the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfiguration {
    pub http: HttpConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfiguration {
    pub routers: BTreeMap<String, Router>,
    pub middlewares: BTreeMap<String, serde_json::Value>,
    pub services: BTreeMap<String, Service>,
}

/// Host-rule router referencing a service in the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    pub entry_points: Vec<String>,
    pub service: String,
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub load_balancer: LoadBalancer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_host_header: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}
