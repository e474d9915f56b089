// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the consistency enum and how many replicas each level
//! must read from.

use crate::replication::{ReplicationFactor, ReplicationStrategy};
use std::fmt::{Display, Formatter};

/// The consistency level enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    /// The any consistency level.
    Any,
    /// The one consistency level.
    One,
    /// The two consistency level.
    Two,
    /// The three consistency level.
    Three,
    /// The quorum consistency level.
    Quorum,
    /// The all consistency level.
    All,
    /// The local quorum consistency level.
    LocalQuorum,
    /// The each quorum consistency level.
    EachQuorum,
    /// The serial consistency level.
    Serial,
    /// The local serial consistency level.
    LocalSerial,
    /// The local one consistency level.
    LocalOne,
}

impl ConsistencyLevel {
    /// Whether the level is scoped to a single data center.
    pub fn is_dc_local(&self) -> bool {
        matches!(self, Self::LocalOne | Self::LocalQuorum | Self::LocalSerial)
    }

    /// The minimum number of replicas that must be read to satisfy the level
    /// under the given replication factor, optionally scoped to `dc`.
    pub fn block_for(&self, replication_factor: &ReplicationFactor, dc: Option<&str>) -> usize {
        match self {
            Self::Any | Self::One | Self::LocalOne => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Quorum | Self::Serial => quorum_of(replication_factor.total()),
            Self::All => replication_factor.total(),
            Self::LocalQuorum | Self::LocalSerial => local_quorum_for(replication_factor, dc),
            Self::EachQuorum => match replication_factor.strategy() {
                ReplicationStrategy::NetworkTopology => replication_factor
                    .options()
                    .values()
                    .map(|count| quorum_of(*count))
                    .sum(),
                ReplicationStrategy::Simple => quorum_of(replication_factor.total()),
            },
        }
    }
}

fn quorum_of(replicas: usize) -> usize {
    replicas / 2 + 1
}

fn local_quorum_for(replication_factor: &ReplicationFactor, dc: Option<&str>) -> usize {
    if replication_factor.strategy() == ReplicationStrategy::NetworkTopology {
        if let Some(count) = dc.and_then(|dc| replication_factor.datacenter(dc)) {
            return quorum_of(count);
        }
    }
    quorum_of(replication_factor.total())
}

impl Display for ConsistencyLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Any => "ANY",
                Self::One => "ONE",
                Self::Two => "TWO",
                Self::Three => "THREE",
                Self::Quorum => "QUORUM",
                Self::All => "ALL",
                Self::LocalQuorum => "LOCAL_QUORUM",
                Self::EachQuorum => "EACH_QUORUM",
                Self::Serial => "SERIAL",
                Self::LocalSerial => "LOCAL_SERIAL",
                Self::LocalOne => "LOCAL_ONE",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn block_for_simple_strategy() {
        let rf = ReplicationFactor::simple(3);
        assert_eq!(ConsistencyLevel::Any.block_for(&rf, None), 1);
        assert_eq!(ConsistencyLevel::One.block_for(&rf, None), 1);
        assert_eq!(ConsistencyLevel::LocalOne.block_for(&rf, None), 1);
        assert_eq!(ConsistencyLevel::Two.block_for(&rf, None), 2);
        assert_eq!(ConsistencyLevel::Three.block_for(&rf, None), 3);
        assert_eq!(ConsistencyLevel::Quorum.block_for(&rf, None), 2);
        assert_eq!(ConsistencyLevel::All.block_for(&rf, None), 3);
    }

    #[test]
    fn block_for_network_topology() {
        let rf = ReplicationFactor::network_topology(btreemap! {
            "DC1".to_string() => 3,
            "DC2".to_string() => 5,
        });
        assert_eq!(ConsistencyLevel::Quorum.block_for(&rf, None), 5);
        assert_eq!(ConsistencyLevel::All.block_for(&rf, None), 8);
        assert_eq!(ConsistencyLevel::LocalQuorum.block_for(&rf, Some("DC1")), 2);
        assert_eq!(ConsistencyLevel::LocalQuorum.block_for(&rf, Some("DC2")), 3);
        assert_eq!(ConsistencyLevel::EachQuorum.block_for(&rf, None), 5);
    }

    #[test]
    fn dc_local_levels() {
        assert!(ConsistencyLevel::LocalOne.is_dc_local());
        assert!(ConsistencyLevel::LocalQuorum.is_dc_local());
        assert!(ConsistencyLevel::LocalSerial.is_dc_local());
        assert!(!ConsistencyLevel::Quorum.is_dc_local());
        assert!(!ConsistencyLevel::EachQuorum.is_dc_local());
    }
}
