// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Replication strategy model: per data center replica counts for
//! NetworkTopologyStrategy, a single synthetic count for SimpleStrategy.

use crate::cql::schema::SHADED_PACKAGE_PREFIX;
use std::collections::BTreeMap;

/// The synthetic option key carrying the SimpleStrategy count.
pub const REPLICATION_FACTOR_OPTION: &str = "replication_factor";

/// The replication strategy of a keyspace.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplicationStrategy {
    /// Rack and data center unaware placement.
    Simple,
    /// Per data center placement.
    NetworkTopology,
}

impl ReplicationStrategy {
    /// The short class name, as written in DDL.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "SimpleStrategy",
            Self::NetworkTopology => "NetworkTopologyStrategy",
        }
    }

    /// The fully qualified, shaded class name used in serialized replication
    /// maps.
    pub fn class_name(&self) -> String {
        format!("{}locator.{}", SHADED_PACKAGE_PREFIX, self.name())
    }
}

/// A keyspace replication factor: the strategy plus its options map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationFactor {
    strategy: ReplicationStrategy,
    options: BTreeMap<String, usize>,
}

impl ReplicationFactor {
    /// A SimpleStrategy factor with the given count.
    pub fn simple(replication_factor: usize) -> Self {
        let mut options = BTreeMap::new();
        options.insert(REPLICATION_FACTOR_OPTION.to_string(), replication_factor);
        Self {
            strategy: ReplicationStrategy::Simple,
            options,
        }
    }

    /// A NetworkTopologyStrategy factor with per data center counts.
    pub fn network_topology(options: BTreeMap<String, usize>) -> Self {
        Self {
            strategy: ReplicationStrategy::NetworkTopology,
            options,
        }
    }

    /// The strategy.
    pub fn strategy(&self) -> ReplicationStrategy {
        self.strategy
    }

    /// The raw options map.
    pub fn options(&self) -> &BTreeMap<String, usize> {
        &self.options
    }

    /// The total replica count across all data centers.
    pub fn total(&self) -> usize {
        self.options.values().sum()
    }

    /// The replica count of a data center, matched case-insensitively.
    /// For SimpleStrategy this is the synthetic total.
    pub fn datacenter(&self, dc: &str) -> Option<usize> {
        match self.strategy {
            ReplicationStrategy::Simple => Some(self.total()),
            ReplicationStrategy::NetworkTopology => self
                .options
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(dc))
                .map(|(_, count)| *count),
        }
    }

    /// The single data center name, iff the strategy is NetworkTopology with
    /// exactly one entry.
    pub fn single_datacenter(&self) -> Option<&str> {
        match self.strategy {
            ReplicationStrategy::NetworkTopology if self.options.len() == 1 => {
                self.options.keys().next().map(|s| s.as_str())
            }
            _ => None,
        }
    }

    /// Serialize to the string map found in keyspace metadata.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("class".to_string(), self.strategy.class_name());
        for (key, count) in &self.options {
            map.insert(key.clone(), count.to_string());
        }
        map
    }

    /// Parse the string map back into a replication factor.
    pub fn from_map(map: &BTreeMap<String, String>) -> anyhow::Result<Self> {
        let class = map
            .get("class")
            .ok_or_else(|| anyhow::anyhow!("replication map has no class"))?;
        let strategy = if class.ends_with(ReplicationStrategy::Simple.name()) {
            ReplicationStrategy::Simple
        } else if class.ends_with(ReplicationStrategy::NetworkTopology.name()) {
            ReplicationStrategy::NetworkTopology
        } else {
            anyhow::bail!("unknown replication strategy: {}", class);
        };
        let mut options = BTreeMap::new();
        for (key, value) in map {
            if key == "class" {
                continue;
            }
            let count: usize = value
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid replica count for {}: {}", key, value))?;
            if count == 0 {
                anyhow::bail!("replica count for {} must be positive", key);
            }
            options.insert(key.clone(), count);
        }
        if options.is_empty() {
            anyhow::bail!("replication map has no replica counts");
        }
        Ok(Self { strategy, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn simple_factor_totals() {
        let rf = ReplicationFactor::simple(3);
        assert_eq!(rf.total(), 3);
        assert_eq!(rf.datacenter("anything"), Some(3));
        assert_eq!(rf.single_datacenter(), None);
    }

    #[test]
    fn network_topology_lookup_is_case_insensitive() {
        let rf = ReplicationFactor::network_topology(btreemap! {
            "DC1".to_string() => 3,
            "DC2".to_string() => 2,
        });
        assert_eq!(rf.total(), 5);
        assert_eq!(rf.datacenter("dc1"), Some(3));
        assert_eq!(rf.datacenter("DC2"), Some(2));
        assert_eq!(rf.datacenter("DC3"), None);
        assert_eq!(rf.single_datacenter(), None);
    }

    #[test]
    fn single_datacenter_is_reported() {
        let rf = ReplicationFactor::network_topology(btreemap! {"DC1".to_string() => 3});
        assert_eq!(rf.single_datacenter(), Some("DC1"));
    }

    #[test]
    fn map_round_trip() {
        for rf in [
            ReplicationFactor::simple(3),
            ReplicationFactor::network_topology(btreemap! {
                "DC1".to_string() => 3,
                "DC2".to_string() => 2,
            }),
        ] {
            let map = rf.to_map();
            assert!(map.get("class").unwrap().starts_with(SHADED_PACKAGE_PREFIX));
            assert_eq!(ReplicationFactor::from_map(&map).unwrap(), rf);
        }
    }

    #[test]
    fn zero_counts_are_rejected() {
        let map = btreemap! {
            "class".to_string() => ReplicationStrategy::NetworkTopology.class_name(),
            "DC1".to_string() => "0".to_string(),
        };
        assert!(ReplicationFactor::from_map(&map).is_err());
    }
}
