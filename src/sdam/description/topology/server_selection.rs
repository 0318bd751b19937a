#[cfg(test)]
mod test;

use std::time::Duration;

use rand::seq::IteratorRandom;

use super::{TopologyDescription, TopologyType};
use crate::{
    sdam::description::server::{ServerDescription, ServerType},
    selection_criteria::{select_by_tags, ReadPreference, SelectionCriteria},
};

/// How long selection sleeps between snapshots when nothing suitable is available.
pub(crate) const SELECTION_BACKOFF: Duration = Duration::from_millis(500);

impl TopologyDescription {
    /// Picks one suitable server uniformly at random from those within the latency window.
    pub(crate) fn select_server<'a>(
        &'a self,
        criteria: &SelectionCriteria,
        local_threshold: Duration,
    ) -> Option<&'a ServerDescription> {
        self.suitable_servers_in_latency_window(criteria, local_threshold)
            .into_iter()
            .choose(&mut rand::rng())
    }

    pub(crate) fn suitable_servers_in_latency_window<'a>(
        &'a self,
        criteria: &SelectionCriteria,
        local_threshold: Duration,
    ) -> Vec<&'a ServerDescription> {
        let mut suitable_servers = match criteria {
            SelectionCriteria::ReadPreference(ref read_pref) => self.suitable_servers(read_pref),
            SelectionCriteria::Predicate(ref filter) => self
                .servers
                .values()
                .filter(|s| s.server_type.is_data_bearing() && filter(*s))
                .collect(),
        };

        let local_threshold = criteria
            .as_read_pref()
            .and_then(ReadPreference::local_threshold)
            .unwrap_or(local_threshold);
        retain_servers_within_latency_window(&mut suitable_servers, local_threshold);

        suitable_servers
    }

    fn suitable_servers<'a>(
        &'a self,
        read_preference: &ReadPreference,
    ) -> Vec<&'a ServerDescription> {
        match self.topology_type {
            TopologyType::Unknown => Vec::new(),
            TopologyType::Single => self.servers.values().filter(|s| s.is_available()).collect(),
            TopologyType::Sharded => self.servers_with_type(&[ServerType::Mongos]).collect(),
            TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => {
                self.suitable_servers_in_replica_set(read_preference)
            }
        }
    }

    fn servers_with_type<'a>(
        &'a self,
        types: &'a [ServerType],
    ) -> impl Iterator<Item = &'a ServerDescription> {
        self.servers
            .values()
            .filter(move |server| types.contains(&server.server_type))
    }

    fn suitable_servers_in_replica_set<'a>(
        &'a self,
        read_preference: &ReadPreference,
    ) -> Vec<&'a ServerDescription> {
        match read_preference {
            ReadPreference::Primary => self.servers_with_type(&[ServerType::RsPrimary]).collect(),
            ReadPreference::Secondary { .. } => self
                .suitable_servers_for_read_preference(&[ServerType::RsSecondary], read_preference),
            ReadPreference::PrimaryPreferred { .. } => {
                match self.servers_with_type(&[ServerType::RsPrimary]).next() {
                    Some(primary) => vec![primary],
                    None => self.suitable_servers_for_read_preference(
                        &[ServerType::RsSecondary],
                        read_preference,
                    ),
                }
            }
            ReadPreference::SecondaryPreferred { .. } => {
                let suitable_servers = self.suitable_servers_for_read_preference(
                    &[ServerType::RsSecondary],
                    read_preference,
                );

                if suitable_servers.is_empty() {
                    self.servers_with_type(&[ServerType::RsPrimary]).collect()
                } else {
                    suitable_servers
                }
            }
            ReadPreference::Nearest { .. } => self.suitable_servers_for_read_preference(
                &[ServerType::RsPrimary, ServerType::RsSecondary],
                read_preference,
            ),
        }
    }

    fn suitable_servers_for_read_preference<'a>(
        &'a self,
        types: &'a [ServerType],
        read_preference: &ReadPreference,
    ) -> Vec<&'a ServerDescription> {
        let mut servers: Vec<_> = self.servers_with_type(types).collect();

        if let Some(max_staleness) = read_preference.max_staleness() {
            servers.retain(|server| {
                server.server_type != ServerType::RsSecondary
                    || server
                        .staleness
                        .is_some_and(|staleness| staleness <= max_staleness)
            });
        }

        select_by_tags(read_preference.tag_sets(), servers)
    }

    pub(crate) fn server_selection_timeout_error_message(
        &self,
        criteria: &SelectionCriteria,
    ) -> String {
        if self.topology_type == TopologyType::ReplicaSetNoPrimary
            && criteria.is_read_pref_primary()
            && !self.has_primary()
        {
            format!(
                "Server selection timeout: None of the available servers is a primary. \
                 Topology: {self}"
            )
        } else {
            format!(
                "Server selection timeout: No available servers match the criteria {criteria}. \
                 Topology: {self}"
            )
        }
    }
}

/// Keeps only the servers whose round trip time is within `local_threshold` of the fastest one.
pub(crate) fn retain_servers_within_latency_window(
    suitable_servers: &mut Vec<&ServerDescription>,
    local_threshold: Duration,
) {
    let Some(shortest_rtt) = suitable_servers
        .iter()
        .map(|server| server.average_round_trip_time)
        .min()
    else {
        return;
    };

    let max_rtt_within_window = shortest_rtt.saturating_add(local_threshold);
    suitable_servers.retain(|server| server.average_round_trip_time <= max_rtt_within_window);
}
