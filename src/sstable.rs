// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Handles to on-disk immutable sorted-string tables. Byte decoding is the
//! downstream reader's job; the coordinator only moves handles around.

use crate::ring::TokenRange;
use std::fmt::Debug;

/// Incremental repair state of a table, as recorded in its metadata.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RepairStatus {
    /// The table was sealed by incremental repair.
    Repaired,
    /// The table holds data not yet repaired.
    Unrepaired,
    /// No repair metadata available.
    Unknown,
}

impl RepairStatus {
    /// Whether the table may hold data not covered by repair. `Unknown`
    /// counts: dropping it on clusters without repair metadata would lose
    /// data, double-reading it cannot.
    pub fn maybe_unrepaired(&self) -> bool {
        !matches!(self, Self::Repaired)
    }
}

/// An opened sorted-string table on some replica.
pub trait SSTable: Send + Sync + Debug {
    /// Name of the table's data file, unique within the cluster.
    fn data_file_name(&self) -> &str;

    /// The table's incremental repair state.
    fn repair_status(&self) -> RepairStatus {
        RepairStatus::Unknown
    }

    /// The token span covered by the table's keys, when the replica exposes
    /// it. Used to drop tables that cannot intersect the fetch range.
    fn token_span(&self) -> Option<TokenRange> {
        None
    }
}
