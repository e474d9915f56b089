// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use super::{CassandraRing, Token, TokenRange};
use crate::cql::murmur3_cassandra_x64_128;

/// The hash function placing partition keys on the ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Partitioner {
    /// The Cassandra Murmur3 partitioner.
    Murmur3,
}

impl Partitioner {
    /// The smallest token of the ring.
    pub fn minimum_token(&self) -> Token {
        match self {
            Self::Murmur3 => i64::MIN as Token,
        }
    }

    /// The largest token of the ring.
    pub fn maximum_token(&self) -> Token {
        match self {
            Self::Murmur3 => i64::MAX as Token,
        }
    }

    /// The full ring as a single open-closed range.
    pub fn full_range(&self) -> TokenRange {
        TokenRange::open_closed(self.minimum_token() - 1, self.maximum_token())
    }

    /// Hash a single-component partition key.
    pub fn hash(&self, key: &[u8]) -> Token {
        match self {
            Self::Murmur3 => murmur3_cassandra_x64_128(key, 0).0 as Token,
        }
    }

    /// Hash a partition key with one or more components. Single components
    /// hash their raw bytes; composites hash the length-prefixed composite
    /// layout (two byte length, value, end-of-component byte).
    pub fn hash_composite(&self, components: &[&[u8]]) -> Token {
        match components {
            [single] => self.hash(single),
            many => {
                let mut buf = Vec::with_capacity(many.iter().map(|c| c.len() + 3).sum());
                for component in many {
                    buf.extend_from_slice(&(component.len() as u16).to_be_bytes());
                    buf.extend_from_slice(component);
                    buf.push(0);
                }
                self.hash(&buf)
            }
        }
    }

    /// The fully qualified class name, as found in cluster metadata.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Murmur3 => "org.apache.cassandra.dht.Murmur3Partitioner",
        }
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::Murmur3
    }
}

/// Splits the ring into a fixed number of engine partitions and maps
/// partition ids to token ranges and back.
#[derive(Clone, Debug)]
pub struct TokenPartitioner {
    ranges: Vec<TokenRange>,
}

impl TokenPartitioner {
    /// Split the ring of `ring` into `partitions` near-equal chunks. The
    /// first chunk absorbs the remainder of the integer division.
    pub fn new(ring: &CassandraRing, partitions: usize) -> anyhow::Result<Self> {
        Self::split(ring.partitioner(), partitions)
    }

    /// Split the given partitioner's ring directly.
    pub fn split(partitioner: &Partitioner, partitions: usize) -> anyhow::Result<Self> {
        if partitions == 0 {
            anyhow::bail!("cannot split a ring into zero partitions");
        }
        let full = partitioner.full_range();
        let chunk = full.width() / partitions as i128;
        if chunk == 0 {
            anyhow::bail!("cannot split {} tokens into {} partitions", full.width(), partitions);
        }
        let remainder = full.width() % partitions as i128;
        let mut ranges = Vec::with_capacity(partitions);
        let mut lower = full.lower();
        for index in 0..partitions {
            let width = if index == 0 { chunk + remainder } else { chunk };
            let upper = lower + width;
            ranges.push(TokenRange::open_closed(lower, upper));
            lower = upper;
        }
        Ok(Self { ranges })
    }

    /// The number of engine partitions.
    pub fn partition_count(&self) -> usize {
        self.ranges.len()
    }

    /// The token range of the given partition.
    pub fn range_of(&self, partition_id: usize) -> Option<&TokenRange> {
        self.ranges.get(partition_id)
    }

    /// The partition whose range contains `token`.
    pub fn partition_for(&self, token: Token) -> Option<usize> {
        match self.ranges.binary_search_by(|range| range.upper().cmp(&token)) {
            Ok(index) => Some(index),
            Err(index) if index < self.ranges.len() && self.ranges[index].contains(token) => Some(index),
            Err(_) => None,
        }
    }

    /// Whether `token` falls in the given partition.
    pub fn is_in(&self, partition_id: usize, token: Token) -> bool {
        self.range_of(partition_id)
            .map(|range| range.contains(token))
            .unwrap_or(false)
    }
}
