// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use super::{install, types::CqlUdt, CqlField, CqlSchema, CqlType, TableMetadata};
use crate::{
    error::{BulkReadError, Result},
    parser::{CreateTableStatement, CreateTypeStatement, TypeExpr},
    replication::ReplicationFactor,
    ring::Partitioner,
};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};

/// The shaded vendor package prefix the embedded parser expects.
pub const SHADED_PACKAGE_PREFIX: &str = "org.apache.cassandra.spark.shaded.fourzero.cassandra.";

const SHADED_MARKER: &str = "spark.shaded.";

lazy_static! {
    static ref UNSHADED_PACKAGE: Regex = Regex::new(r"\borg\.apache\.cassandra\.").unwrap();
}

/// Rewrite every unshaded vendor package prefix in `statement` to the shaded
/// one. Occurrences already carrying the shaded prefix are left alone, so the
/// rewrite is idempotent.
pub fn convert_to_shaded_packages(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut last = 0;
    for found in UNSHADED_PACKAGE.find_iter(statement) {
        if statement[found.end()..].starts_with(SHADED_MARKER) {
            continue;
        }
        out.push_str(&statement[last..found.start()]);
        out.push_str(SHADED_PACKAGE_PREFIX);
        last = found.end();
    }
    out.push_str(&statement[last..]);
    out
}

/// Builds an immutable [`CqlSchema`] from a table DDL and the user defined
/// type DDLs it depends on, and installs it into the process-wide registry.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    create_stmt: String,
    keyspace: String,
    replication_factor: ReplicationFactor,
    partitioner: Partitioner,
    udt_stmts: Vec<String>,
}

impl SchemaBuilder {
    /// Start a build for the given table DDL, keyspace and replication.
    pub fn new<S: Into<String>, K: Into<String>>(
        create_stmt: S,
        keyspace: K,
        replication_factor: ReplicationFactor,
    ) -> Self {
        Self {
            create_stmt: create_stmt.into(),
            keyspace: keyspace.into(),
            replication_factor,
            partitioner: Partitioner::default(),
            udt_stmts: Vec::new(),
        }
    }

    /// Bind the schema to a partitioner.
    pub fn partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// Supply the user defined type DDLs the table references.
    pub fn udts<I: IntoIterator<Item = String>>(mut self, udt_stmts: I) -> Self {
        self.udt_stmts = udt_stmts.into_iter().collect();
        self
    }

    /// Parse, validate, register and return the schema.
    pub fn build(self) -> Result<CqlSchema> {
        let create_stmt = convert_to_shaded_packages(&self.create_stmt);

        let mut raw_udts = Vec::with_capacity(self.udt_stmts.len());
        for stmt in &self.udt_stmts {
            let parsed: CreateTypeStatement = convert_to_shaded_packages(stmt)
                .parse()
                .map_err(BulkReadError::SchemaParse)?;
            raw_udts.push(parsed);
        }
        let udts = resolve_udts(raw_udts, &self.keyspace)?;

        let table: CreateTableStatement = create_stmt.parse().map_err(BulkReadError::SchemaParse)?;
        if let Some(stmt_keyspace) = &table.keyspace {
            if stmt_keyspace != &self.keyspace {
                debug!(
                    "binding table {} to keyspace {} (statement names {})",
                    table.table, self.keyspace, stmt_keyspace
                );
            }
        }

        let mut fields = Vec::with_capacity(table.columns.len());
        for (position, column) in table.columns.iter().enumerate() {
            let resolved = resolve_type(&column.data_type, &udts)?;
            resolved.validate()?;
            let data_type = if resolved.is_freezable_single_cell() {
                resolved.frozen()
            } else {
                resolved
            };
            fields.push(CqlField {
                name: column.name.clone(),
                data_type,
                position,
                is_partition_key: table.partition_keys.contains(&column.name),
                is_clustering_column: table.clustering_keys.contains(&column.name),
                is_static: column.static_column,
            });
        }

        let metadata = TableMetadata {
            keyspace: self.keyspace.clone(),
            table: table.table.clone(),
            columns: fields.clone(),
        };
        install(&self.replication_factor, &metadata, &udts)?;

        let mut reachable = Vec::new();
        for field in &fields {
            field.data_type.collect_udts(&mut reachable);
        }
        let udt_set: HashSet<CqlUdt> = reachable.into_iter().collect();

        fields.sort();
        Ok(CqlSchema::new(
            self.keyspace,
            table.table,
            create_stmt,
            self.replication_factor,
            self.partitioner,
            fields,
            udt_set,
        ))
    }
}

// Iterative fixpoint: a type resolves once everything it references has
// resolved; a pass without progress means the graph is cyclic or references
// a type that was never supplied.
fn resolve_udts(raw: Vec<CreateTypeStatement>, default_keyspace: &str) -> Result<HashMap<String, CqlUdt>> {
    let mut queue: VecDeque<CreateTypeStatement> = raw.into();
    let mut resolved: HashMap<String, CqlUdt> = HashMap::new();
    while !queue.is_empty() {
        let mut progressed = false;
        for _ in 0..queue.len() {
            if let Some(stmt) = queue.pop_front() {
                if stmt.referenced_udts().iter().all(|name| resolved.contains_key(name)) {
                    let keyspace = stmt
                        .keyspace
                        .clone()
                        .unwrap_or_else(|| default_keyspace.to_string());
                    let mut fields = Vec::with_capacity(stmt.fields.len());
                    for (name, expr) in &stmt.fields {
                        fields.push((name.clone(), resolve_type(expr, &resolved)?));
                    }
                    resolved.insert(stmt.name.clone(), CqlUdt::new(keyspace, stmt.name, fields));
                    progressed = true;
                } else {
                    queue.push_back(stmt);
                }
            }
        }
        if !progressed {
            return Err(BulkReadError::SchemaCycle(
                queue.iter().map(|stmt| stmt.name.clone()).collect(),
            ));
        }
    }
    Ok(resolved)
}

fn resolve_type(expr: &TypeExpr, udts: &HashMap<String, CqlUdt>) -> Result<CqlType> {
    Ok(match expr {
        TypeExpr::Native(native) => CqlType::Native(*native),
        TypeExpr::List(inner) => CqlType::List(Box::new(resolve_type(inner, udts)?)),
        TypeExpr::Set(inner) => CqlType::Set(Box::new(resolve_type(inner, udts)?)),
        TypeExpr::Map(key, value) => CqlType::Map(
            Box::new(resolve_type(key, udts)?),
            Box::new(resolve_type(value, udts)?),
        ),
        TypeExpr::Tuple(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                out.push(resolve_type(field, udts)?);
            }
            CqlType::Tuple(out)
        }
        TypeExpr::Frozen(inner) => CqlType::Frozen(Box::new(resolve_type(inner, udts)?)),
        TypeExpr::UserDefined { name, .. } => CqlType::Udt(
            udts.get(name)
                .cloned()
                .ok_or_else(|| BulkReadError::SchemaParse(anyhow::anyhow!("unknown user defined type: {}", name)))?,
        ),
    })
}
