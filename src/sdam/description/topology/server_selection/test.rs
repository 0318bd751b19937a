use std::{collections::HashSet, time::Duration};

use pretty_assertions::assert_eq;

use super::retain_servers_within_latency_window;
use crate::{
    options::ServerAddress,
    sdam::{ServerDescription, ServerType, TopologyDescription, TopologyType},
    selection_criteria::{ReadPreference, ReadPreferenceOptions, SelectionCriteria, TagSet},
};

const THRESHOLD: Duration = Duration::from_millis(15);

fn server(port: u16, server_type: ServerType, rtt_ms: u64) -> ServerDescription {
    ServerDescription::new(ServerAddress::new("localhost", port), server_type)
        .with_round_trip_time(Duration::from_millis(rtt_ms))
}

fn tags(pairs: &[(&str, &str)]) -> TagSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A primary on 27017 and secondaries on 27018 (tagged ny) and 27019 (tagged sf, lagging).
fn replica_set() -> TopologyDescription {
    TopologyDescription::new(TopologyType::ReplicaSetWithPrimary)
        .with_server(server(27017, ServerType::RsPrimary, 5))
        .with_server(
            server(27018, ServerType::RsSecondary, 5)
                .with_tags(tags(&[("dc", "ny")]))
                .with_staleness(Duration::from_secs(10)),
        )
        .with_server(
            server(27019, ServerType::RsSecondary, 5)
                .with_tags(tags(&[("dc", "sf")]))
                .with_staleness(Duration::from_secs(200)),
        )
        .with_server(server(27020, ServerType::Unknown, 1))
}

fn suitable(topology: &TopologyDescription, criteria: impl Into<SelectionCriteria>) -> Vec<u16> {
    let mut ports: Vec<_> = topology
        .suitable_servers_in_latency_window(&criteria.into(), THRESHOLD)
        .into_iter()
        .map(|server| server.address.port_or_default())
        .collect();
    ports.sort_unstable();
    ports
}

fn secondary_with(options: ReadPreferenceOptions) -> ReadPreference {
    ReadPreference::secondary(options)
}

#[test]
fn replica_set_modes() {
    let topology = replica_set();

    assert_eq!(suitable(&topology, ReadPreference::Primary), vec![27017]);
    assert_eq!(
        suitable(&topology, ReadPreference::secondary(Default::default())),
        vec![27018, 27019]
    );
    assert_eq!(
        suitable(&topology, ReadPreference::primary_preferred(Default::default())),
        vec![27017]
    );
    assert_eq!(
        suitable(&topology, ReadPreference::secondary_preferred(Default::default())),
        vec![27018, 27019]
    );
    assert_eq!(
        suitable(&topology, ReadPreference::nearest(Default::default())),
        vec![27017, 27018, 27019]
    );
}

#[test]
fn replica_set_without_primary() {
    let topology = TopologyDescription::new(TopologyType::ReplicaSetNoPrimary)
        .with_server(server(27018, ServerType::RsSecondary, 5))
        .with_server(server(27019, ServerType::RsSecondary, 5));

    assert!(suitable(&topology, ReadPreference::Primary).is_empty());
    assert_eq!(
        suitable(&topology, ReadPreference::primary_preferred(Default::default())),
        vec![27018, 27019]
    );

    let message = topology.server_selection_timeout_error_message(&ReadPreference::Primary.into());
    assert!(message.contains("None of the available servers is a primary"), "{message}");
}

#[test]
fn secondary_preferred_falls_back_to_the_primary() {
    let topology = replica_set();
    let read_pref = ReadPreference::secondary_preferred(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tags(&[("dc", "la")])])
            .build(),
    );
    assert_eq!(suitable(&topology, read_pref), vec![27017]);
}

#[test]
fn tag_sets_narrow_secondaries() {
    let topology = replica_set();

    let read_pref = secondary_with(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tags(&[("dc", "sf")]), tags(&[("dc", "ny")])])
            .build(),
    );
    assert_eq!(suitable(&topology, read_pref), vec![27019]);

    let read_pref = secondary_with(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tags(&[("dc", "la")])])
            .build(),
    );
    assert!(suitable(&topology, read_pref).is_empty());
}

#[test]
fn max_staleness_excludes_lagging_secondaries() {
    let topology = replica_set()
        .with_server(server(27021, ServerType::RsSecondary, 5));

    let read_pref = secondary_with(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(90))
            .build(),
    );
    // 27019 lags too far behind and 27021 has no estimate.
    assert_eq!(suitable(&topology, read_pref), vec![27018]);

    // the primary is never stale.
    let read_pref = ReadPreference::nearest(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(90))
            .build(),
    );
    assert_eq!(suitable(&topology, read_pref), vec![27017, 27018]);

    // zero means no bound.
    let read_pref = secondary_with(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::ZERO)
            .build(),
    );
    assert_eq!(suitable(&topology, read_pref), vec![27018, 27019, 27021]);
}

#[test]
fn sharded_selects_mongos_only() {
    let topology = TopologyDescription::new(TopologyType::Sharded)
        .with_server(server(27017, ServerType::Mongos, 5))
        .with_server(server(27018, ServerType::Mongos, 10))
        .with_server(server(27019, ServerType::Unknown, 1));

    // read preferences are forwarded to the mongos rather than applied here.
    assert_eq!(
        suitable(&topology, ReadPreference::secondary(Default::default())),
        vec![27017, 27018]
    );
    assert_eq!(suitable(&topology, ReadPreference::Primary), vec![27017, 27018]);
}

#[test]
fn single_selects_any_available_server() {
    let topology = TopologyDescription::new(TopologyType::Single)
        .with_server(server(27017, ServerType::RsSecondary, 5));
    assert_eq!(suitable(&topology, ReadPreference::Primary), vec![27017]);

    let unknown = TopologyDescription::new(TopologyType::Single)
        .with_server(server(27017, ServerType::Unknown, 5));
    assert!(suitable(&unknown, ReadPreference::Primary).is_empty());
}

#[test]
fn unknown_topology_selects_nothing() {
    let topology = TopologyDescription::new(TopologyType::Unknown)
        .with_server(server(27017, ServerType::Standalone, 5));
    assert!(suitable(&topology, ReadPreference::nearest(Default::default())).is_empty());
    assert!(topology
        .select_server(&ReadPreference::Primary.into(), THRESHOLD)
        .is_none());
}

#[test]
fn latency_window() {
    let topology = TopologyDescription::new(TopologyType::Sharded)
        .with_server(server(27017, ServerType::Mongos, 10))
        .with_server(server(27018, ServerType::Mongos, 25))
        .with_server(server(27019, ServerType::Mongos, 26));

    assert_eq!(suitable(&topology, ReadPreference::Primary), vec![27017, 27018]);

    let narrow = ReadPreference::nearest(
        ReadPreferenceOptions::builder()
            .local_threshold(Duration::ZERO)
            .build(),
    );
    assert_eq!(suitable(&topology, narrow), vec![27017]);
}

#[test]
fn latency_window_of_nothing() {
    let mut servers = Vec::new();
    retain_servers_within_latency_window(&mut servers, THRESHOLD);
    assert!(servers.is_empty());
}

#[test]
fn selection_is_spread_across_the_window() {
    let topology = TopologyDescription::new(TopologyType::Sharded)
        .with_server(server(27017, ServerType::Mongos, 5))
        .with_server(server(27018, ServerType::Mongos, 6))
        .with_server(server(27019, ServerType::Mongos, 100));
    let criteria = ReadPreference::Primary.into();

    let mut seen = HashSet::new();
    for _ in 0..200 {
        let selected = topology.select_server(&criteria, THRESHOLD).unwrap();
        seen.insert(selected.address.port_or_default());
    }
    assert_eq!(seen, HashSet::from([27017, 27018]));
}

#[test]
fn predicate_criteria() {
    let topology = replica_set();
    let criteria = SelectionCriteria::from_address(ServerAddress::new("localhost", 27019));
    assert_eq!(suitable(&topology, criteria), vec![27019]);

    // predicates never select servers of unknown type.
    let criteria = SelectionCriteria::from_address(ServerAddress::new("localhost", 27020));
    assert!(suitable(&topology, criteria).is_empty());
}
