// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Per-replica fetches and the coordinator that drives them: primaries run
//! concurrently, failures promote backups, and the engine can cancel the
//! whole partition cooperatively.

use super::{replica::ReplicaSet, PartitionedDataLayer};
use crate::{
    error::{BulkReadError, Result},
    filter::PartitionFilter,
    ring::{CassandraInstance, TokenRange},
    sstable::SSTable,
};
use futures::{stream::FuturesUnordered, Future, StreamExt};
use log::{debug, warn};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// One replica's listing of the sorted-string tables overlapping a token
/// range.
pub struct SingleReplica<L: PartitionedDataLayer> {
    layer: Arc<L>,
    instance: CassandraInstance,
    range: TokenRange,
    partition_id: usize,
    filters: Arc<Vec<Arc<dyn PartitionFilter>>>,
    repair_primary: bool,
    segregated: bool,
}

impl<L: PartitionedDataLayer> SingleReplica<L> {
    fn new(
        layer: Arc<L>,
        instance: CassandraInstance,
        range: TokenRange,
        partition_id: usize,
        filters: Arc<Vec<Arc<dyn PartitionFilter>>>,
        repair_primary: bool,
        segregated: bool,
    ) -> Self {
        Self {
            layer,
            instance,
            range,
            partition_id,
            filters,
            repair_primary,
            segregated,
        }
    }

    /// The replica being listed.
    pub fn instance(&self) -> &CassandraInstance {
        &self.instance
    }

    /// Whether this replica's repaired tables are authoritative.
    pub fn is_repair_primary(&self) -> bool {
        self.repair_primary
    }

    /// List the replica's tables, bounded by the layer's per-replica
    /// deadline. Non-intersecting tables are dropped when the layer asks for
    /// it; repaired tables are dropped unless this replica is the repair
    /// primary (repaired data is identical across replicas, reading it once
    /// is enough).
    pub async fn fetch(&self) -> anyhow::Result<Vec<Arc<dyn SSTable>>> {
        let listing = self
            .layer
            .list_instance(self.partition_id, &self.range, &self.instance);
        let listed = match self.layer.list_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, listing)
                .await
                .map_err(|_| anyhow::anyhow!("listing {} timed out after {:?}", self.instance, deadline))??,
            None => listing.await?,
        };
        self.layer.stats().sstables_listed(&self.instance, listed.len());
        let mut tables = Vec::with_capacity(listed.len());
        for table in listed {
            if self.layer.filter_non_intersecting_sstables()
                && !self.filters.iter().all(|f| f.filter_sstable(table.as_ref()))
            {
                self.layer.stats().sstable_skipped(table.data_file_name());
                continue;
            }
            if self.segregated && !self.repair_primary && !table.repair_status().maybe_unrepaired() {
                continue;
            }
            tables.push(table);
        }
        Ok(tables)
    }
}

/// How a partition fetch ended when it did not fail.
#[derive(Debug)]
pub enum FetchOutcome {
    /// All primaries completed; the combined table set, in no particular
    /// order.
    Complete(Vec<Arc<dyn SSTable>>),
    /// The engine cancelled the partition; partial results were dropped.
    Cancelled,
}

/// The multi-replica coordinator of one engine partition.
pub struct MultipleReplicas<L: PartitionedDataLayer> {
    layer: Arc<L>,
    partition_id: usize,
    range: TokenRange,
    primaries: Vec<SingleReplica<L>>,
    backups: VecDeque<SingleReplica<L>>,
    cancel: CancellationToken,
}

fn drive<L: PartitionedDataLayer>(
    replica: SingleReplica<L>,
) -> impl Future<Output = (SingleReplica<L>, anyhow::Result<Vec<Arc<dyn SSTable>>>)> {
    async move {
        let result = replica.fetch().await;
        (replica, result)
    }
}

impl<L: PartitionedDataLayer> MultipleReplicas<L> {
    pub(crate) fn new(
        layer: Arc<L>,
        replicas: ReplicaSet,
        range: TokenRange,
        filters: Vec<Arc<dyn PartitionFilter>>,
    ) -> Self {
        let segregated = replicas.repair_primary().is_some();
        let partition_id = replicas.partition_id();
        let filters = Arc::new(filters);
        let primaries = replicas
            .primary()
            .iter()
            .map(|instance| {
                let repair_primary = replicas.repair_primary().map(|r| r == instance).unwrap_or(false);
                SingleReplica::new(
                    layer.clone(),
                    instance.clone(),
                    range,
                    partition_id,
                    filters.clone(),
                    repair_primary,
                    segregated,
                )
            })
            .collect();
        let backups = replicas
            .backup()
            .iter()
            .map(|instance| {
                SingleReplica::new(
                    layer.clone(),
                    instance.clone(),
                    range,
                    partition_id,
                    filters.clone(),
                    false,
                    segregated,
                )
            })
            .collect();
        Self {
            layer,
            partition_id,
            range,
            primaries,
            backups,
            cancel: CancellationToken::new(),
        }
    }

    /// The engine partition being fetched.
    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    /// The partition's token range.
    pub fn range(&self) -> &TokenRange {
        &self.range
    }

    /// A handle the engine can use to cancel the partition.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive every primary to completion, promoting backups on failure.
    ///
    /// Succeeds once all current primaries have completed; fails with
    /// [`BulkReadError::ReadFailure`] when the backup pool is exhausted and a
    /// primary still fails. Cancellation drops partial results and completes
    /// with [`FetchOutcome::Cancelled`] without raising.
    pub async fn fetch(self) -> Result<FetchOutcome> {
        let Self {
            layer,
            partition_id,
            range,
            primaries,
            mut backups,
            cancel,
        } = self;
        let mut in_flight = FuturesUnordered::new();
        let mut attempted: Vec<CassandraInstance> = Vec::new();
        for replica in primaries {
            attempted.push(replica.instance().clone());
            in_flight.push(drive(replica));
        }
        let mut merged: HashMap<String, Arc<dyn SSTable>> = HashMap::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    layer.stats().fetch_cancelled(partition_id);
                    debug!("partition {} cancelled, dropping partial results", partition_id);
                    return Ok(FetchOutcome::Cancelled);
                }
                next = in_flight.next() => {
                    match next {
                        None => break,
                        Some((replica, Ok(tables))) => {
                            debug!(
                                "replica {} delivered {} tables for partition {}",
                                replica.instance(),
                                tables.len(),
                                partition_id
                            );
                            for table in tables {
                                merged.insert(table.data_file_name().to_string(), table);
                            }
                        }
                        Some((failed, Err(error))) => {
                            layer.stats().replica_fetch_failed(failed.instance(), &error);
                            warn!(
                                "replica {} failed for partition {}: {:#}",
                                failed.instance(),
                                partition_id,
                                error
                            );
                            match backups.pop_front() {
                                Some(mut promoted) => {
                                    // the replacement takes over the failed
                                    // replica's repair-primary role
                                    promoted.repair_primary = failed.repair_primary;
                                    layer.stats().backup_promoted(failed.instance(), promoted.instance());
                                    attempted.push(promoted.instance().clone());
                                    in_flight.push(drive(promoted));
                                }
                                None => {
                                    layer.stats().read_failure(partition_id);
                                    return Err(BulkReadError::ReadFailure {
                                        partition_id,
                                        range,
                                        attempted,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(FetchOutcome::Complete(merged.into_values().collect()))
    }
}
