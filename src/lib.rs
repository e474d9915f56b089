// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A distributed bulk reader for Cassandra token rings: splits the ring into
//! engine partitions, plans which replicas each partition reads from under a
//! consistency level, fetches the overlapping sorted-string tables from those
//! replicas with failover, and models the CQL schema the rows are decoded
//! against.

pub mod cql;
pub mod error;
pub mod filter;
pub mod layer;
pub mod replication;
pub mod ring;
pub mod sstable;
pub mod stats;

pub(crate) mod parser;

pub mod prelude {
    pub use super::{
        cql::{
            schema::{CqlField, CqlSchema, CqlType, CqlUdt, NativeType, SchemaBuilder},
            ConsistencyLevel,
        },
        error::BulkReadError,
        filter::{PartitionFilter, PartitionKeyFilter, RangeFilter},
        layer::{
            AvailabilityHint, BlockingExecutor, FetchOutcome, MultipleReplicas, PartitionedDataLayer, ReplicaSet,
            SingleReplica,
        },
        replication::{ReplicationFactor, ReplicationStrategy},
        ring::{CassandraInstance, CassandraRing, Partitioner, Token, TokenPartitioner, TokenRange},
        sstable::{RepairStatus, SSTable},
        stats::{NoopStats, Stats},
    };
}
