// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The token ring model: tokens, token ranges, cluster instances and the
//! immutable sub-range to replica-list map computed from them.

use crate::replication::{ReplicationFactor, ReplicationStrategy};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
};

mod partitioner;
pub use partitioner::{Partitioner, TokenPartitioner};

/// The token of the ring.
///
/// Murmur3 tokens occupy the `i64` range; the wider integer keeps range-width
/// and midpoint arithmetic overflow-free.
pub type Token = i128;

/// An open-closed token interval `(lower, upper]`.
///
/// A vnode owns the tokens strictly above its left bound up to and including
/// its right bound. Ring wrap-around is represented upstream by two
/// non-wrapping ranges, so `lower <= upper` always holds here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRange {
    lower: Token,
    upper: Token,
}

impl TokenRange {
    /// Create the range `(lower, upper]`.
    pub fn open_closed(lower: Token, upper: Token) -> Self {
        debug_assert!(lower <= upper);
        Self { lower, upper }
    }

    /// The exclusive lower bound.
    pub fn lower(&self) -> Token {
        self.lower
    }

    /// The inclusive upper bound.
    pub fn upper(&self) -> Token {
        self.upper
    }

    /// Whether the range contains no tokens.
    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    /// Number of tokens in the range.
    pub fn width(&self) -> i128 {
        self.upper - self.lower
    }

    /// Whether `token` falls inside the range.
    pub fn contains(&self, token: Token) -> bool {
        token > self.lower && token <= self.upper
    }

    /// Whether the union of the two ranges is itself a contiguous range.
    /// Touching ranges such as `(0, 5]` and `(5, 10]` are connected.
    pub fn is_connected(&self, other: &TokenRange) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    /// The non-empty intersection of the two ranges, if any.
    pub fn intersection(&self, other: &TokenRange) -> Option<TokenRange> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        if lower < upper {
            Some(TokenRange { lower, upper })
        } else {
            None
        }
    }
}

impl Display for TokenRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.lower, self.upper)
    }
}

/// A cluster instance: node name, ring token and data center.
///
/// Equality and hashing consider the node name only; the remaining fields are
/// immutable attributes of that identity.
#[derive(Clone, Debug)]
pub struct CassandraInstance {
    node_name: String,
    token: Token,
    data_center: String,
}

impl CassandraInstance {
    /// Create a new instance identity.
    pub fn new<N: Into<String>, D: Into<String>>(node_name: N, token: Token, data_center: D) -> Self {
        Self {
            node_name: node_name.into(),
            token,
            data_center: data_center.into(),
        }
    }

    /// The node name.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The instance's ring token.
    pub fn token(&self) -> Token {
        self.token
    }

    /// The data center the instance lives in.
    pub fn data_center(&self) -> &str {
        &self.data_center
    }
}

impl PartialEq for CassandraInstance {
    fn eq(&self, other: &Self) -> bool {
        self.node_name == other.node_name
    }
}

impl Eq for CassandraInstance {}

impl Hash for CassandraInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_name.hash(state);
    }
}

impl Display for CassandraInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.node_name, self.data_center)
    }
}

/// An immutable mapping from contiguous token sub-ranges to ordered replica
/// lists, together with the partitioner and replication factor that produced
/// it.
///
/// The sub-ranges cover the full ring exactly once; each replica list has
/// length equal to the total replication factor (given enough distinct
/// instances per data center).
#[derive(Clone, Debug)]
pub struct CassandraRing {
    partitioner: Partitioner,
    replication_factor: ReplicationFactor,
    sub_ranges: Vec<(TokenRange, Vec<CassandraInstance>)>,
}

impl CassandraRing {
    /// Build the ring from the given instances.
    ///
    /// Instances are sorted by token; each sorted token becomes the right
    /// bound of a vnode and the final vnode is extended to the ring maximum,
    /// wrapping back onto the first instance.
    pub fn new(
        partitioner: Partitioner,
        replication_factor: ReplicationFactor,
        instances: Vec<CassandraInstance>,
    ) -> anyhow::Result<Self> {
        if instances.is_empty() {
            anyhow::bail!("cannot build a ring without instances");
        }
        let mut sorted = instances;
        sorted.sort_by_key(|i| i.token());
        for pair in sorted.windows(2) {
            if pair[0].token() == pair[1].token() {
                anyhow::bail!(
                    "instances {} and {} share token {}",
                    pair[0],
                    pair[1],
                    pair[0].token()
                );
            }
        }
        let mut sub_ranges = Vec::with_capacity(sorted.len() + 1);
        let mut recent_left = partitioner.minimum_token() - 1;
        for (index, instance) in sorted.iter().enumerate() {
            let range = TokenRange::open_closed(recent_left, instance.token());
            sub_ranges.push((range, walk_clockwise(&sorted, index, &replication_factor)));
            recent_left = instance.token();
        }
        // the wrap-around remainder belongs to the first instance clockwise
        if recent_left != partitioner.maximum_token() {
            let range = TokenRange::open_closed(recent_left, partitioner.maximum_token());
            sub_ranges.push((range, walk_clockwise(&sorted, 0, &replication_factor)));
        }
        Ok(Self {
            partitioner,
            replication_factor,
            sub_ranges,
        })
    }

    /// The partitioner that produced this ring.
    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// The replication factor that produced this ring.
    pub fn replication_factor(&self) -> &ReplicationFactor {
        &self.replication_factor
    }

    /// All sub-ranges with their replica lists, in ring order.
    pub fn sub_ranges(&self) -> &[(TokenRange, Vec<CassandraInstance>)] {
        &self.sub_ranges
    }

    /// The sub-range map restricted to `range`: every overlapping sub-range
    /// trimmed to its intersection, replica lists preserved.
    pub fn sub_ranges_in(&self, range: &TokenRange) -> Vec<(TokenRange, Vec<CassandraInstance>)> {
        self.sub_ranges
            .iter()
            .filter_map(|(sub_range, replicas)| {
                sub_range
                    .intersection(range)
                    .map(|trimmed| (trimmed, replicas.clone()))
            })
            .collect()
    }

    /// The replica list for the sub-range containing `token`.
    pub fn replicas_for(&self, token: Token) -> &[CassandraInstance] {
        match self
            .sub_ranges
            .binary_search_by(|(range, _)| range.upper().cmp(&token))
        {
            Ok(index) => &self.sub_ranges[index].1,
            Err(index) => {
                let index = index.min(self.sub_ranges.len() - 1);
                &self.sub_ranges[index].1
            }
        }
    }

    /// The distinct instances of the ring, in token order.
    pub fn instances(&self) -> Vec<CassandraInstance> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, replicas) in &self.sub_ranges {
            for replica in replicas {
                if seen.insert(replica.node_name().to_string()) {
                    out.push(replica.clone());
                }
            }
        }
        out.sort_by_key(|i| i.token());
        out
    }
}

// Walk clockwise from the owning instance, collecting replicas until the
// replication factor is satisfied: the next `rf` distinct instances for
// SimpleStrategy, per data center counts for NetworkTopologyStrategy.
fn walk_clockwise(
    sorted: &[CassandraInstance],
    start: usize,
    replication_factor: &ReplicationFactor,
) -> Vec<CassandraInstance> {
    let mut replicas: Vec<CassandraInstance> = Vec::new();
    match replication_factor.strategy() {
        ReplicationStrategy::Simple => {
            let want = replication_factor.total();
            for offset in 0..sorted.len() {
                if replicas.len() >= want {
                    break;
                }
                let candidate = &sorted[(start + offset) % sorted.len()];
                if !replicas.contains(candidate) {
                    replicas.push(candidate.clone());
                }
            }
        }
        ReplicationStrategy::NetworkTopology => {
            for offset in 0..sorted.len() {
                if replication_factor
                    .options()
                    .iter()
                    .all(|(dc, want)| count_in_dc(&replicas, dc) >= *want)
                {
                    break;
                }
                let candidate = &sorted[(start + offset) % sorted.len()];
                let want = replication_factor.datacenter(candidate.data_center()).unwrap_or(0);
                if count_in_dc(&replicas, candidate.data_center()) < want && !replicas.contains(candidate) {
                    replicas.push(candidate.clone());
                }
            }
        }
    }
    replicas
}

fn count_in_dc(replicas: &[CassandraInstance], dc: &str) -> usize {
    replicas
        .iter()
        .filter(|r| r.data_center().eq_ignore_ascii_case(dc))
        .count()
}
