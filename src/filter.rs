// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Partition pruning filters pushed down by the engine, plus the automatic
//! per-partition range filter the layer always adds.

use crate::{
    ring::{Partitioner, Token, TokenRange},
    sstable::SSTable,
};
use std::fmt::Debug;

/// A pruning filter over engine partitions and partition keys.
pub trait PartitionFilter: Send + Sync + Debug {
    /// Whether any key matched by this filter can fall in `range`.
    fn overlaps(&self, range: &TokenRange) -> bool;

    /// Whether the partition owning `token` can be skipped entirely.
    fn skip_partition(&self, token: Token) -> bool;

    /// Whether the filter can judge individual partition keys.
    fn can_filter_by_key(&self) -> bool;

    /// Whether the serialized key passes the filter. Filters that cannot
    /// judge keys accept everything.
    fn filter_key(&self, key: &[u8]) -> bool;

    /// Whether an opened table may still hold matching rows. Tables that do
    /// not expose a token span always pass.
    fn filter_sstable(&self, _sstable: &dyn SSTable) -> bool {
        true
    }

    /// Whether the filter pins an exact token interval.
    fn is_specific_range(&self) -> bool;

    /// Downcast hook for the automatic range filter.
    fn as_range_filter(&self) -> Option<&RangeFilter> {
        None
    }
}

/// Interval containment over an engine partition's token range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RangeFilter {
    range: TokenRange,
}

impl RangeFilter {
    /// Filter to the given token range.
    pub fn new(range: TokenRange) -> Self {
        Self { range }
    }

    /// The filtered range.
    pub fn range(&self) -> &TokenRange {
        &self.range
    }
}

impl PartitionFilter for RangeFilter {
    fn overlaps(&self, range: &TokenRange) -> bool {
        self.range.intersection(range).is_some()
    }

    fn skip_partition(&self, token: Token) -> bool {
        !self.range.contains(token)
    }

    fn can_filter_by_key(&self) -> bool {
        false
    }

    fn filter_key(&self, _key: &[u8]) -> bool {
        true
    }

    fn filter_sstable(&self, sstable: &dyn SSTable) -> bool {
        sstable
            .token_span()
            .map(|span| span.intersection(&self.range).is_some())
            .unwrap_or(true)
    }

    fn is_specific_range(&self) -> bool {
        true
    }

    fn as_range_filter(&self) -> Option<&RangeFilter> {
        Some(self)
    }
}

/// An exact partition key filter; the key's ring token is fixed at
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionKeyFilter {
    key: Vec<u8>,
    token: Token,
}

impl PartitionKeyFilter {
    /// Filter to a single serialized partition key, hashed with
    /// `partitioner`.
    pub fn new(key: Vec<u8>, partitioner: &Partitioner) -> Self {
        let token = partitioner.hash(&key);
        Self { key, token }
    }

    /// Filter to a composite partition key.
    pub fn composite(components: &[&[u8]], partitioner: &Partitioner) -> Self {
        let token = partitioner.hash_composite(components);
        let mut key = Vec::new();
        for component in components {
            key.extend_from_slice(component);
        }
        Self { key, token }
    }

    /// The key's ring token.
    pub fn token(&self) -> Token {
        self.token
    }
}

impl PartitionFilter for PartitionKeyFilter {
    fn overlaps(&self, range: &TokenRange) -> bool {
        range.contains(self.token)
    }

    fn skip_partition(&self, token: Token) -> bool {
        token != self.token
    }

    fn can_filter_by_key(&self) -> bool {
        true
    }

    fn filter_key(&self, key: &[u8]) -> bool {
        key == &self.key[..]
    }

    fn filter_sstable(&self, sstable: &dyn SSTable) -> bool {
        sstable
            .token_span()
            .map(|span| span.contains(self.token))
            .unwrap_or(true)
    }

    fn is_specific_range(&self) -> bool {
        false
    }
}
