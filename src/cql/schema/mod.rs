// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The schema model: typed columns, table metadata and the process-wide
//! keyspace registry rows are decoded against.

use crate::{error::BulkReadError, replication::ReplicationFactor, ring::Partitioner};
use arc_swap::ArcSwapOption;
use lazy_static::lazy_static;
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

mod builder;
mod types;

pub use builder::{convert_to_shaded_packages, SchemaBuilder, SHADED_PACKAGE_PREFIX};
pub use types::{CqlType, CqlUdt, NativeType};

/// A single table column with its role in the primary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CqlField {
    /// The column name.
    pub name: String,
    /// The resolved column type.
    pub data_type: CqlType,
    /// Index of the column in table definition order.
    pub position: usize,
    /// Whether the column is part of the partition key.
    pub is_partition_key: bool,
    /// Whether the column is a clustering column.
    pub is_clustering_column: bool,
    /// Whether the column is static.
    pub is_static: bool,
}

impl CqlField {
    fn rank(&self) -> u8 {
        if self.is_partition_key {
            0
        } else if self.is_clustering_column {
            1
        } else {
            2
        }
    }
}

impl PartialOrd for CqlField {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CqlField {
    /// Partition key columns first (in definition order), then clustering
    /// columns (in definition order), then the rest by name.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| {
            if self.rank() < 2 {
                self.position.cmp(&other.position)
            } else {
                self.name.cmp(&other.name)
            }
        })
    }
}

/// Keyspace-scoped table metadata with columns in schema definition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMetadata {
    /// The owning keyspace.
    pub keyspace: String,
    /// The table name.
    pub table: String,
    /// Columns in schema definition order.
    pub columns: Vec<CqlField>,
}

/// A registered keyspace: its replication plus the installed tables and
/// user defined types.
#[derive(Clone, Debug)]
pub struct KeyspaceMetadata {
    /// The keyspace name.
    pub name: String,
    /// The keyspace replication factor.
    pub replication: ReplicationFactor,
    /// Installed tables, by name.
    pub tables: HashMap<String, TableMetadata>,
    /// Installed user defined types, by name.
    pub udts: HashMap<String, CqlUdt>,
}

/// The immutable schema handed to the rest of the system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CqlSchema {
    keyspace: String,
    table: String,
    create_stmt: String,
    replication_factor: ReplicationFactor,
    partitioner: Partitioner,
    fields: Vec<CqlField>,
    udts: HashSet<CqlUdt>,
}

impl CqlSchema {
    pub(crate) fn new(
        keyspace: String,
        table: String,
        create_stmt: String,
        replication_factor: ReplicationFactor,
        partitioner: Partitioner,
        fields: Vec<CqlField>,
        udts: HashSet<CqlUdt>,
    ) -> Self {
        Self {
            keyspace,
            table,
            create_stmt,
            replication_factor,
            partitioner,
            fields,
            udts,
        }
    }

    /// The keyspace name.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The (shaded) DDL the schema was built from.
    pub fn create_stmt(&self) -> &str {
        &self.create_stmt
    }

    /// The keyspace replication factor.
    pub fn replication_factor(&self) -> &ReplicationFactor {
        &self.replication_factor
    }

    /// The partitioner the schema is bound to.
    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// All fields, sorted: partition keys, clustering columns, the rest.
    pub fn fields(&self) -> &[CqlField] {
        &self.fields
    }

    /// Look up a field by column name.
    pub fn field(&self, name: &str) -> Option<&CqlField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The partition key columns, in key order.
    pub fn partition_keys(&self) -> impl Iterator<Item = &CqlField> {
        self.fields.iter().filter(|f| f.is_partition_key)
    }

    /// The clustering columns, in key order.
    pub fn clustering_columns(&self) -> impl Iterator<Item = &CqlField> {
        self.fields.iter().filter(|f| f.is_clustering_column)
    }

    /// The user defined types reachable from the table's columns.
    pub fn udts(&self) -> &HashSet<CqlUdt> {
        &self.udts
    }
}

// The process-wide registry: installs are serialized by the mutex, reads go
// through the lock-free snapshot. Poisoning is ignored because installs
// replace the snapshot wholesale.
lazy_static! {
    static ref INSTALL_LOCK: Mutex<()> = Mutex::new(());
}

static KEYSPACES: ArcSwapOption<HashMap<String, KeyspaceMetadata>> = ArcSwapOption::const_empty();

/// A snapshot of a registered keyspace.
pub fn keyspace_metadata(keyspace: &str) -> Option<KeyspaceMetadata> {
    KEYSPACES.load().as_ref().and_then(|map| map.get(keyspace).cloned())
}

/// A snapshot of a registered table.
pub fn table_metadata(keyspace: &str, table: &str) -> Option<TableMetadata> {
    keyspace_metadata(keyspace).and_then(|ks| ks.tables.get(table).cloned())
}

pub(crate) fn install(
    replication: &ReplicationFactor,
    table: &TableMetadata,
    udts: &HashMap<String, CqlUdt>,
) -> crate::error::Result<()> {
    {
        let _guard = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = KEYSPACES.load().as_deref().cloned().unwrap_or_default();
        let keyspace = map.entry(table.keyspace.clone()).or_insert_with(|| KeyspaceMetadata {
            name: table.keyspace.clone(),
            replication: replication.clone(),
            tables: HashMap::new(),
            udts: HashMap::new(),
        });
        keyspace
            .tables
            .entry(table.table.clone())
            .or_insert_with(|| table.clone());
        for (name, udt) in udts {
            keyspace.udts.entry(name.clone()).or_insert_with(|| udt.clone());
        }
        KEYSPACES.store(Some(Arc::new(map)));
    }
    // post-conditions: both installs must be visible to readers
    let registered = keyspace_metadata(&table.keyspace).ok_or_else(|| BulkReadError::SchemaRegistration {
        keyspace: table.keyspace.clone(),
        table: table.table.clone(),
        reason: "keyspace missing after registration".to_string(),
    })?;
    if !registered.tables.contains_key(&table.table) {
        return Err(BulkReadError::SchemaRegistration {
            keyspace: table.keyspace.clone(),
            table: table.table.clone(),
            reason: "table missing after registration".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::schema::types::NativeType;

    fn field(name: &str, position: usize, pk: bool, ck: bool) -> CqlField {
        CqlField {
            name: name.to_string(),
            data_type: CqlType::Native(NativeType::Int),
            position,
            is_partition_key: pk,
            is_clustering_column: ck,
            is_static: false,
        }
    }

    #[test]
    fn field_ordering_puts_keys_first() {
        let mut fields = vec![
            field("zz", 0, false, false),
            field("ck2", 3, false, true),
            field("aa", 1, false, false),
            field("pk", 4, true, false),
            field("ck1", 2, false, true),
        ];
        fields.sort();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["pk", "ck1", "ck2", "aa", "zz"]);
    }

    #[test]
    fn install_is_idempotent() {
        let table = TableMetadata {
            keyspace: "registry_test_ks".to_string(),
            table: "t1".to_string(),
            columns: vec![field("k", 0, true, false)],
        };
        let rf = ReplicationFactor::simple(1);
        install(&rf, &table, &HashMap::new()).unwrap();
        let first = keyspace_metadata("registry_test_ks").unwrap();
        install(&rf, &table, &HashMap::new()).unwrap();
        let second = keyspace_metadata("registry_test_ks").unwrap();
        assert_eq!(first.tables.len(), second.tables.len());
        assert_eq!(first.replication, second.replication);
        assert!(table_metadata("registry_test_ks", "t1").is_some());
    }
}
