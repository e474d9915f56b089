// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the bulk reader. Everything fatal surfaces as a
//! [`BulkReadError`] on the partition being read; cancellation is not an
//! error (see [`crate::layer::FetchOutcome`]).

use crate::{
    cql::ConsistencyLevel,
    ring::{CassandraInstance, TokenRange},
};
use thiserror::Error;

/// The bulk reader error.
#[derive(Error, Debug)]
pub enum BulkReadError {
    /// The consistency level cannot be used for bulk reads, or requires a
    /// data center which was not supplied.
    #[error("consistency level {cl} cannot be used: {reason}")]
    InvalidConsistency {
        /// The offending consistency level.
        cl: ConsistencyLevel,
        /// Why it was rejected.
        reason: String,
    },
    /// The consistency level is recognized but not implemented.
    #[error("consistency level {0} is not implemented")]
    NotImplemented(ConsistencyLevel),
    /// A table or user defined type DDL failed to parse.
    #[error("failed to parse schema: {0:#}")]
    SchemaParse(anyhow::Error),
    /// A column type is outside the accepted set.
    #[error("unsupported CQL type: {0}")]
    UnsupportedType(String),
    /// The user defined type graph is not acyclic.
    #[error("user defined types cannot be resolved, cycle among: {0:?}")]
    SchemaCycle(Vec<String>),
    /// The keyspace or table was missing after registration.
    #[error("schema registration failed for {keyspace}.{table}: {reason}")]
    SchemaRegistration {
        /// The keyspace being installed.
        keyspace: String,
        /// The table being installed.
        table: String,
        /// The violated post-condition.
        reason: String,
    },
    /// The consistency level is unachievable for a ring sub-range.
    #[error("not enough replicas in {range}: need {want}, have {got} (dc: {dc:?})")]
    NotEnoughReplicas {
        /// The sub-range which could not be covered.
        range: TokenRange,
        /// Replicas required by the consistency level.
        want: usize,
        /// Replicas actually available.
        got: usize,
        /// The data center restriction in effect, if any.
        dc: Option<String>,
    },
    /// No caller-supplied filter intersects the partition's token range.
    #[error("no filter matches the token range of partition {partition_id}")]
    NoMatchFound {
        /// The engine partition being read.
        partition_id: usize,
    },
    /// Every replica attempt for the partition failed.
    #[error("read failed for partition {partition_id} in {range}, attempted {attempted:?}")]
    ReadFailure {
        /// The engine partition being read.
        partition_id: usize,
        /// The partition's token range.
        range: TokenRange,
        /// The replicas that were attempted, in launch order.
        attempted: Vec<CassandraInstance>,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BulkReadError>;
