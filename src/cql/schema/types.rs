// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BulkReadError, Result};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// The native CQL type kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeType {
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Empty,
    Float,
    Inet,
    Int,
    Smallint,
    Text,
    Time,
    Timestamp,
    Timeuuid,
    Tinyint,
    Uuid,
    Varchar,
    Varint,
}

impl NativeType {
    /// Whether the bulk reader can materialize values of this kind.
    /// Counter shards live outside the data model and cannot be read.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Counter)
    }
}

impl FromStr for NativeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "ascii" => NativeType::Ascii,
            "bigint" => NativeType::Bigint,
            "blob" => NativeType::Blob,
            "boolean" => NativeType::Boolean,
            "counter" => NativeType::Counter,
            "date" => NativeType::Date,
            "decimal" => NativeType::Decimal,
            "double" => NativeType::Double,
            "duration" => NativeType::Duration,
            "empty" => NativeType::Empty,
            "float" => NativeType::Float,
            "inet" => NativeType::Inet,
            "int" => NativeType::Int,
            "smallint" => NativeType::Smallint,
            "text" => NativeType::Text,
            "time" => NativeType::Time,
            "timestamp" => NativeType::Timestamp,
            "timeuuid" => NativeType::Timeuuid,
            "tinyint" => NativeType::Tinyint,
            "uuid" => NativeType::Uuid,
            "varchar" => NativeType::Varchar,
            "varint" => NativeType::Varint,
            _ => anyhow::bail!("Invalid native type: {}", s),
        })
    }
}

impl Display for NativeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                NativeType::Ascii => "ascii",
                NativeType::Bigint => "bigint",
                NativeType::Blob => "blob",
                NativeType::Boolean => "boolean",
                NativeType::Counter => "counter",
                NativeType::Date => "date",
                NativeType::Decimal => "decimal",
                NativeType::Double => "double",
                NativeType::Duration => "duration",
                NativeType::Empty => "empty",
                NativeType::Float => "float",
                NativeType::Inet => "inet",
                NativeType::Int => "int",
                NativeType::Smallint => "smallint",
                NativeType::Text => "text",
                NativeType::Time => "time",
                NativeType::Timestamp => "timestamp",
                NativeType::Timeuuid => "timeuuid",
                NativeType::Tinyint => "tinyint",
                NativeType::Uuid => "uuid",
                NativeType::Varchar => "varchar",
                NativeType::Varint => "varint",
            }
        )
    }
}

/// A resolved user defined type: a named, ordered list of typed fields
/// scoped to a keyspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CqlUdt {
    keyspace: String,
    name: String,
    fields: Vec<(String, CqlType)>,
}

impl CqlUdt {
    /// Create a resolved user defined type.
    pub fn new<K: Into<String>, N: Into<String>>(keyspace: K, name: N, fields: Vec<(String, CqlType)>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            fields,
        }
    }

    /// The keyspace the type is scoped to.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered fields.
    pub fn fields(&self) -> &[(String, CqlType)] {
        &self.fields
    }

    /// The type of a field, by name.
    pub fn field(&self, name: &str) -> Option<&CqlType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

impl Display for CqlUdt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.name)
    }
}

/// A CQL column type, recursively defined.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CqlType {
    /// A native kind.
    Native(NativeType),
    /// A multi-cell list.
    List(Box<CqlType>),
    /// A multi-cell set.
    Set(Box<CqlType>),
    /// A multi-cell map.
    Map(Box<CqlType>, Box<CqlType>),
    /// A tuple of positional fields.
    Tuple(Vec<CqlType>),
    /// A user defined type.
    Udt(CqlUdt),
    /// An immutable, single-cell encoding of the inner type.
    Frozen(Box<CqlType>),
}

impl CqlType {
    /// Validate the type by structural recursion: every reachable native
    /// kind must be supported.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Native(native) => {
                if native.is_supported() {
                    Ok(())
                } else {
                    Err(BulkReadError::UnsupportedType(native.to_string()))
                }
            }
            Self::List(inner) | Self::Set(inner) | Self::Frozen(inner) => inner.validate(),
            Self::Map(key, value) => {
                key.validate()?;
                value.validate()
            }
            Self::Tuple(fields) => fields.iter().try_for_each(|f| f.validate()),
            Self::Udt(udt) => udt.fields().iter().try_for_each(|(_, t)| t.validate()),
        }
    }

    /// Whether the type can be frozen into a single cell but is multi-cell
    /// when written without `frozen<>`. Collections stay multi-cell; user
    /// defined types and tuples are frozen implicitly.
    pub fn is_freezable_single_cell(&self) -> bool {
        matches!(self, Self::Udt(_) | Self::Tuple(_))
    }

    /// Wrap in `Frozen` unless already frozen.
    pub fn frozen(self) -> CqlType {
        match self {
            frozen @ Self::Frozen(_) => frozen,
            other => Self::Frozen(Box::new(other)),
        }
    }

    /// Collect the user defined types reachable from this type.
    pub fn collect_udts(&self, out: &mut Vec<CqlUdt>) {
        match self {
            Self::Native(_) => {}
            Self::List(inner) | Self::Set(inner) | Self::Frozen(inner) => inner.collect_udts(out),
            Self::Map(key, value) => {
                key.collect_udts(out);
                value.collect_udts(out);
            }
            Self::Tuple(fields) => fields.iter().for_each(|f| f.collect_udts(out)),
            Self::Udt(udt) => {
                if !out.contains(udt) {
                    out.push(udt.clone());
                }
                udt.fields().iter().for_each(|(_, t)| t.collect_udts(out));
            }
        }
    }
}

impl Display for CqlType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native(n) => n.fmt(f),
            Self::List(inner) => write!(f, "list<{}>", inner),
            Self::Set(inner) => write!(f, "set<{}>", inner),
            Self::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            Self::Tuple(fields) => {
                write!(f, "tuple<")?;
                for (index, field) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    field.fmt(f)?;
                }
                write!(f, ">")
            }
            Self::Udt(udt) => udt.fmt(f),
            Self::Frozen(inner) => write!(f, "frozen<{}>", inner),
        }
    }
}
