// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Replica planning: which replicas an engine partition reads from first,
//! which stand by for failover, and whether the consistency level is
//! achievable at all.

use super::AvailabilityHint;
use crate::{
    cql::ConsistencyLevel,
    error::{BulkReadError, Result},
    filter::PartitionFilter,
    replication::{ReplicationFactor, ReplicationStrategy},
    ring::{CassandraInstance, CassandraRing, TokenRange},
    stats::Stats,
};
use log::warn;
use std::{collections::HashSet, sync::Arc};

/// The planned replicas of one engine partition.
#[derive(Clone, Debug)]
pub struct ReplicaSet {
    primary: Vec<CassandraInstance>,
    backup: Vec<CassandraInstance>,
    repair_primary: Option<CassandraInstance>,
    min_replicas: usize,
    partition_id: usize,
}

impl ReplicaSet {
    /// Replicas contacted on the first attempt, best availability first.
    pub fn primary(&self) -> &[CassandraInstance] {
        &self.primary
    }

    /// Standby replicas, used only after a primary fetch fails.
    pub fn backup(&self) -> &[CassandraInstance] {
        &self.backup
    }

    /// The replica whose repaired tables are authoritative, if repair
    /// segregation is enabled for this partition.
    pub fn repair_primary(&self) -> Option<&CassandraInstance> {
        self.repair_primary.as_ref()
    }

    /// The consistency level's replica requirement.
    pub fn min_replicas(&self) -> usize {
        self.min_replicas
    }

    /// The engine partition this set was planned for.
    pub fn partition_id(&self) -> usize {
        self.partition_id
    }
}

/// Reject consistency levels the bulk reader cannot honor, and resolve the
/// effective data center for DC-local levels.
pub fn validate_consistency<'a>(
    consistency: ConsistencyLevel,
    replication_factor: &'a ReplicationFactor,
    dc: Option<&'a str>,
) -> Result<Option<&'a str>> {
    match consistency {
        ConsistencyLevel::Serial | ConsistencyLevel::LocalSerial => {
            return Err(BulkReadError::InvalidConsistency {
                cl: consistency,
                reason: "serial reads require a paxos round".to_string(),
            });
        }
        ConsistencyLevel::EachQuorum => {
            return Err(BulkReadError::NotImplemented(consistency));
        }
        _ => {}
    }
    if replication_factor.strategy() != ReplicationStrategy::NetworkTopology {
        return Ok(dc);
    }
    let effective = dc.or_else(|| replication_factor.single_datacenter());
    match (effective, consistency.is_dc_local()) {
        (None, true) => Err(BulkReadError::InvalidConsistency {
            cl: consistency,
            reason: "a data center is required".to_string(),
        }),
        (Some(dc), _) => {
            if replication_factor.datacenter(dc).unwrap_or(0) == 0 {
                Err(BulkReadError::InvalidConsistency {
                    cl: consistency,
                    reason: format!("data center {} has no replicas", dc),
                })
            } else {
                Ok(Some(dc))
            }
        }
        (None, false) => Ok(None),
    }
}

/// Plan the replicas of an engine partition.
///
/// Candidates come from the ring sub-ranges overlapping `range` (narrowed by
/// any key-capable filters), are restricted to the effective data center for
/// DC-local levels, sorted by availability, and split into a primary set of
/// `block_for` replicas with the rest standing by. Every observed sub-range
/// must then be covered by enough primaries.
pub fn split_replicas<A>(
    consistency: ConsistencyLevel,
    dc: Option<&str>,
    ring: &CassandraRing,
    range: &TokenRange,
    filters: &[Arc<dyn PartitionFilter>],
    availability: A,
    stats: &dyn Stats,
    partition_id: usize,
) -> Result<ReplicaSet>
where
    A: Fn(&CassandraInstance) -> AvailabilityHint,
{
    let replication_factor = ring.replication_factor();
    let dc = validate_consistency(consistency, replication_factor, dc)?;

    let mut sub_ranges = ring.sub_ranges_in(range);
    let key_filters: Vec<_> = filters.iter().filter(|f| f.can_filter_by_key()).collect();
    if !key_filters.is_empty() {
        sub_ranges.retain(|(sub_range, _)| key_filters.iter().any(|f| f.overlaps(sub_range)));
    }

    let mut seen = HashSet::new();
    let mut candidates: Vec<CassandraInstance> = Vec::new();
    for (_, replicas) in &sub_ranges {
        for replica in replicas {
            if seen.insert(replica.node_name().to_string()) {
                candidates.push(replica.clone());
            }
        }
    }
    if consistency.is_dc_local() {
        if let Some(dc) = dc {
            candidates.retain(|instance| instance.data_center().eq_ignore_ascii_case(dc));
        }
    }

    let min_replicas = consistency.block_for(replication_factor, dc);
    candidates.sort_by_key(|instance| availability(instance));

    let backup = candidates.split_off(min_replicas.min(candidates.len()));
    let primary = candidates;
    if primary.len() < min_replicas {
        stats.not_enough_replicas(range);
        return Err(BulkReadError::NotEnoughReplicas {
            range: *range,
            want: min_replicas,
            got: primary.len(),
            dc: dc.map(str::to_string),
        });
    }

    let repair_primary = if sub_ranges.len() == 1 {
        primary.first().cloned()
    } else {
        warn!(
            "partition {} spans {} ring sub-ranges, disabling repaired/unrepaired segregation",
            partition_id,
            sub_ranges.len()
        );
        None
    };

    // consistency is validated per sub-range, not in aggregate
    for (sub_range, replicas) in &sub_ranges {
        let covered = replicas.iter().filter(|r| primary.contains(r)).count();
        if covered < min_replicas {
            stats.not_enough_replicas(sub_range);
            return Err(BulkReadError::NotEnoughReplicas {
                range: *sub_range,
                want: min_replicas,
                got: covered,
                dc: dc.map(str::to_string),
            });
        }
    }

    Ok(ReplicaSet {
        primary,
        backup,
        repair_primary,
        min_replicas,
        partition_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ring::Partitioner,
        stats::NoopStats,
    };
    use maplit::{btreemap, hashmap};
    use std::collections::HashMap;

    fn dc1_ring(names: &[(&str, i64)]) -> CassandraRing {
        let instances = names
            .iter()
            .map(|(name, token)| CassandraInstance::new(*name, *token as i128, "DC1"))
            .collect();
        CassandraRing::new(
            Partitioner::Murmur3,
            ReplicationFactor::network_topology(btreemap! {"DC1".to_string() => 3}),
            instances,
        )
        .unwrap()
    }

    fn hints(map: HashMap<&'static str, AvailabilityHint>) -> impl Fn(&CassandraInstance) -> AvailabilityHint {
        move |instance| *map.get(instance.node_name()).unwrap_or(&AvailabilityHint::Unknown)
    }

    #[test]
    fn serial_levels_are_rejected() {
        let rf = ReplicationFactor::simple(3);
        for cl in [ConsistencyLevel::Serial, ConsistencyLevel::LocalSerial] {
            assert!(matches!(
                validate_consistency(cl, &rf, None),
                Err(BulkReadError::InvalidConsistency { .. })
            ));
        }
    }

    #[test]
    fn each_quorum_is_not_implemented() {
        let rf = ReplicationFactor::simple(3);
        assert!(matches!(
            validate_consistency(ConsistencyLevel::EachQuorum, &rf, None),
            Err(BulkReadError::NotImplemented(ConsistencyLevel::EachQuorum))
        ));
    }

    #[test]
    fn dc_local_without_dc_needs_a_single_dc() {
        let multi = ReplicationFactor::network_topology(btreemap! {
            "DC1".to_string() => 3,
            "DC2".to_string() => 3,
        });
        assert!(matches!(
            validate_consistency(ConsistencyLevel::LocalQuorum, &multi, None),
            Err(BulkReadError::InvalidConsistency { .. })
        ));
        let single = ReplicationFactor::network_topology(btreemap! {"DC1".to_string() => 3});
        assert_eq!(
            validate_consistency(ConsistencyLevel::LocalQuorum, &single, None).unwrap(),
            Some("DC1")
        );
    }

    #[test]
    fn unknown_dc_is_rejected() {
        let rf = ReplicationFactor::network_topology(btreemap! {"DC1".to_string() => 3});
        assert!(matches!(
            validate_consistency(ConsistencyLevel::LocalQuorum, &rf, Some("DC9")),
            Err(BulkReadError::InvalidConsistency { .. })
        ));
    }

    #[test]
    fn local_quorum_prefers_available_replicas() {
        let ring = dc1_ring(&[("up1", -100), ("up2", 0), ("down", 100)]);
        let availability = hints(hashmap! {
            "up1" => AvailabilityHint::Up,
            "up2" => AvailabilityHint::Up,
            "down" => AvailabilityHint::Down,
        });
        let full = Partitioner::Murmur3.full_range();
        let set = split_replicas(
            ConsistencyLevel::LocalQuorum,
            Some("DC1"),
            &ring,
            &full,
            &[],
            availability,
            &NoopStats,
            0,
        )
        .unwrap();
        assert_eq!(set.min_replicas(), 2);
        let primary: Vec<_> = set.primary().iter().map(|i| i.node_name()).collect();
        assert_eq!(primary.len(), 2);
        assert!(primary.contains(&"up1"));
        assert!(primary.contains(&"up2"));
        let backup: Vec<_> = set.backup().iter().map(|i| i.node_name()).collect();
        assert_eq!(backup, vec!["down"]);
        // the full ring spans several sub-ranges, so the repair primary is off
        assert!(set.repair_primary().is_none());
        let primary_set: HashSet<_> = set.primary().iter().collect();
        let backup_set: HashSet<_> = set.backup().iter().collect();
        assert!(primary_set.is_disjoint(&backup_set));
    }

    #[test]
    fn repair_primary_set_for_single_sub_range() {
        let ring = dc1_ring(&[("up1", -100), ("up2", 0), ("down", 100)]);
        let availability = hints(hashmap! {
            "up1" => AvailabilityHint::Up,
            "up2" => AvailabilityHint::Up,
            "down" => AvailabilityHint::Down,
        });
        // a narrow engine range observing exactly one ring sub-range
        let narrow = TokenRange::open_closed(-50, -10);
        let set = split_replicas(
            ConsistencyLevel::LocalQuorum,
            Some("DC1"),
            &ring,
            &narrow,
            &[],
            availability,
            &NoopStats,
            3,
        )
        .unwrap();
        assert_eq!(set.partition_id(), 3);
        let repair = set.repair_primary().unwrap();
        assert!(set.primary().contains(repair));
        assert_eq!(repair.node_name(), set.primary()[0].node_name());
    }

    #[test]
    fn quorum_boundary_counts() {
        // quorum of rf=3 is 2: two candidates pass, one fails
        let narrow = TokenRange::open_closed(-50, -10);
        let only = |keep: &'static [&'static str]| {
            move |instance: &CassandraInstance| {
                if keep.contains(&instance.node_name()) {
                    AvailabilityHint::Up
                } else {
                    AvailabilityHint::Down
                }
            }
        };
        let two_ring = dc1_ring(&[("a", -100), ("b", 0)]);
        let set = split_replicas(
            ConsistencyLevel::Quorum,
            None,
            &two_ring,
            &narrow,
            &[],
            only(&["a", "b"]),
            &NoopStats,
            0,
        )
        .unwrap();
        assert_eq!(set.min_replicas(), 2);
        assert_eq!(set.primary().len(), 2);
        assert!(set.backup().is_empty());

        let one_ring = dc1_ring(&[("a", -100)]);
        let err = split_replicas(
            ConsistencyLevel::Quorum,
            None,
            &one_ring,
            &narrow,
            &[],
            only(&["a"]),
            &NoopStats,
            0,
        )
        .unwrap_err();
        match err {
            BulkReadError::NotEnoughReplicas { want, got, .. } => {
                assert_eq!(want, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected NotEnoughReplicas, got {:?}", other),
        }
    }

    #[test]
    fn backup_is_empty_when_primaries_fall_short() {
        let ring = dc1_ring(&[("a", 0)]);
        let err = split_replicas(
            ConsistencyLevel::Quorum,
            None,
            &ring,
            &TokenRange::open_closed(10, 20),
            &[],
            |_: &CassandraInstance| AvailabilityHint::Up,
            &NoopStats,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, BulkReadError::NotEnoughReplicas { got: 1, .. }));
    }
}
