//! Membership filter for the discovered inventory.

use crate::docker::ContainerRecord;

/// Selects the containers eligible for routing.
///
/// A record is kept iff it is attached to the configured network and at least
/// one of its raw name aliases ends with the configured suffix. Both values
/// are injected at construction so deployments with different naming schemes
/// can reuse the pipeline.
#[derive(Debug, Clone)]
pub struct MembershipFilter {
    network_name: String,
    name_suffix: String,
}

impl MembershipFilter {
    pub fn new(network_name: impl Into<String>, name_suffix: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            name_suffix: name_suffix.into(),
        }
    }

    /// Returns the matching records in their original order.
    ///
    /// An empty result is a normal outcome, not an error.
    pub fn filter(&self, records: Vec<ContainerRecord>) -> Vec<ContainerRecord> {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .collect()
    }

    fn matches(&self, record: &ContainerRecord) -> bool {
        record.networks.has(&self.network_name)
            && record
                .names
                .iter()
                .any(|name| name.ends_with(&self.name_suffix))
    }
}
