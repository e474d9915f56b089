// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Observability sink for the data layer. Every hook defaults to a no-op so
//! implementations only override what they record.

use crate::ring::{CassandraInstance, TokenRange};

/// Counters and timers emitted by planning and fetching.
#[allow(unused_variables)]
pub trait Stats: Send + Sync {
    /// A replica finished listing its tables.
    fn sstables_listed(&self, instance: &CassandraInstance, count: usize) {}

    /// A listed table was dropped because its token span cannot intersect
    /// the fetch range.
    fn sstable_skipped(&self, data_file_name: &str) {}

    /// A replica fetch failed.
    fn replica_fetch_failed(&self, instance: &CassandraInstance, error: &anyhow::Error) {}

    /// A backup replica was promoted after a primary failure.
    fn backup_promoted(&self, failed: &CassandraInstance, promoted: &CassandraInstance) {}

    /// Planning found a sub-range that cannot satisfy the consistency level.
    fn not_enough_replicas(&self, range: &TokenRange) {}

    /// All replica attempts for a partition were exhausted.
    fn read_failure(&self, partition_id: usize) {}

    /// A partition fetch was cancelled by the engine.
    fn fetch_cancelled(&self, partition_id: usize) {}
}

/// The default sink: records nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopStats;

impl Stats for NoopStats {}
