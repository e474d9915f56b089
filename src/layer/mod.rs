// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The partitioned data layer: the abstract supplier contract the core
//! consumes, and the engine-facing API built on top of it.

use crate::{
    cql::ConsistencyLevel,
    error::{BulkReadError, Result},
    filter::{PartitionFilter, RangeFilter},
    ring::{CassandraInstance, CassandraRing, Token, TokenPartitioner, TokenRange},
    sstable::SSTable,
    stats::{NoopStats, Stats},
};
use async_trait::async_trait;
use log::trace;
use std::{sync::Arc, time::Duration};

mod executor;
mod fetcher;
mod replica;

pub use executor::BlockingExecutor;
pub use fetcher::{FetchOutcome, MultipleReplicas, SingleReplica};
pub use replica::{split_replicas, validate_consistency, ReplicaSet};

/// Out-of-band guess about a replica's health, used only to order attempts.
/// The ordering is the try-first order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AvailabilityHint {
    /// The replica is believed up.
    Up = 0,
    /// Nothing is known about the replica.
    Unknown = 1,
    /// The replica is believed down.
    Down = 2,
}

impl Default for AvailabilityHint {
    fn default() -> Self {
        Self::Unknown
    }
}

/// The abstract operations a concrete data layer supplies, plus the
/// engine-facing API provided on top of them.
///
/// One engine partition is read by calling [`PartitionedDataLayer::sstables`]
/// and awaiting the returned coordinator.
#[async_trait]
pub trait PartitionedDataLayer: Send + Sync + 'static {
    /// The token ring being read.
    fn ring(&self) -> &CassandraRing;

    /// The engine partition split of the ring.
    fn token_partitioner(&self) -> &TokenPartitioner;

    /// The consistency level reads must satisfy.
    fn consistency_level(&self) -> ConsistencyLevel {
        ConsistencyLevel::LocalQuorum
    }

    /// The data center reads are scoped to, for DC-local levels.
    fn datacenter(&self) -> Option<&str> {
        None
    }

    /// The bounded executor replica listings run on.
    fn executor(&self) -> &BlockingExecutor;

    /// The observability sink.
    fn stats(&self) -> &dyn Stats {
        static NOOP: NoopStats = NoopStats;
        &NOOP
    }

    /// The availability hint for an instance.
    fn availability(&self, _instance: &CassandraInstance) -> AvailabilityHint {
        AvailabilityHint::default()
    }

    /// Whether listings should drop tables whose token span cannot intersect
    /// the fetch range.
    fn filter_non_intersecting_sstables(&self) -> bool {
        true
    }

    /// The per-replica listing deadline, if any.
    fn list_timeout(&self) -> Option<Duration> {
        None
    }

    /// List the sorted-string tables on `instance` overlapping `range`.
    /// Implementations dispatch blocking I/O through [`Self::executor`] and
    /// must never block the scheduling thread.
    async fn list_instance(
        &self,
        partition_id: usize,
        range: &TokenRange,
        instance: &CassandraInstance,
    ) -> anyhow::Result<Vec<Arc<dyn SSTable>>>;

    /// Number of engine partitions.
    fn partition_count(&self) -> usize {
        self.token_partitioner().partition_count()
    }

    /// Whether the row keyed by `key` (already hashed to `token`) belongs to
    /// the given engine partition.
    fn is_in_partition(&self, partition_id: usize, token: Token, key: &[u8]) -> bool {
        let matched = self.token_partitioner().is_in(partition_id, token);
        if !matched {
            trace!(
                "key of {} bytes (token {}) is outside partition {}",
                key.len(),
                token,
                partition_id
            );
        }
        matched
    }

    /// Augment the caller's filters with the automatic range filter of the
    /// given partition. Fails with [`BulkReadError::NoMatchFound`] when the
    /// caller supplied filters and none of them intersects the partition.
    fn filters_in_range(
        &self,
        partition_id: usize,
        filters: &[Arc<dyn PartitionFilter>],
    ) -> Result<Vec<Arc<dyn PartitionFilter>>> {
        let range = *self
            .token_partitioner()
            .range_of(partition_id)
            .ok_or(BulkReadError::NoMatchFound { partition_id })?;
        if !filters.is_empty() && !filters.iter().any(|f| f.overlaps(&range)) {
            return Err(BulkReadError::NoMatchFound { partition_id });
        }
        let mut augmented = filters.to_vec();
        augmented.push(Arc::new(RangeFilter::new(range)));
        Ok(augmented)
    }

    /// Plan and return the multi-replica coordinator for one engine
    /// partition. The read itself happens when the coordinator is awaited.
    fn sstables(
        self: Arc<Self>,
        partition_id: usize,
        filters: &[Arc<dyn PartitionFilter>],
    ) -> Result<MultipleReplicas<Self>>
    where
        Self: Sized,
    {
        let filters = self.filters_in_range(partition_id, filters)?;
        let range = *self
            .token_partitioner()
            .range_of(partition_id)
            .ok_or(BulkReadError::NoMatchFound { partition_id })?;
        let replicas = split_replicas(
            self.consistency_level(),
            self.datacenter(),
            self.ring(),
            &range,
            &filters,
            |instance| self.availability(instance),
            self.stats(),
            partition_id,
        )?;
        Ok(MultipleReplicas::new(self, replicas, range, filters))
    }
}
