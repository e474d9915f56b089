use super::{
    Angles, Comma, Dot, LeftParen, Name, Parens, Parse, RightParen, Semicolon, StatementStream, CREATE, EXISTS,
    FROZEN, IF, KEY, LIST, MAP, NOT, PRIMARY, SET, STATIC, TABLE, TUPLE, TYPE, WITH,
};
use crate::cql::schema::NativeType;
use std::str::FromStr;

/// A parsed CQL type literal. User defined types stay unresolved references
/// until the schema builder materializes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpr {
    Native(NativeType),
    List(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Frozen(Box<TypeExpr>),
    UserDefined {
        keyspace: Option<String>,
        name: String,
    },
}

impl TypeExpr {
    /// Collect the names of user defined types this expression references.
    pub fn referenced_udts(&self, out: &mut Vec<String>) {
        match self {
            Self::Native(_) => {}
            Self::List(inner) | Self::Set(inner) | Self::Frozen(inner) => inner.referenced_udts(out),
            Self::Map(key, value) => {
                key.referenced_udts(out);
                value.referenced_udts(out);
            }
            Self::Tuple(fields) => fields.iter().for_each(|f| f.referenced_udts(out)),
            Self::UserDefined { name, .. } => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
    }
}

impl Parse for TypeExpr {
    type Output = Self;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        Ok(if s.parse_if::<FROZEN>().is_some() {
            Self::Frozen(Box::new(s.parse_from::<Angles<TypeExpr>>()?))
        } else if s.parse_if::<MAP>().is_some() {
            let (key, _, value) = s.parse_from::<Angles<(TypeExpr, Comma, TypeExpr)>>()?;
            Self::Map(Box::new(key), Box::new(value))
        } else if s.parse_if::<SET>().is_some() {
            Self::Set(Box::new(s.parse_from::<Angles<TypeExpr>>()?))
        } else if s.parse_if::<LIST>().is_some() {
            Self::List(Box::new(s.parse_from::<Angles<TypeExpr>>()?))
        } else if s.parse_if::<TUPLE>().is_some() {
            Self::Tuple(s.parse_from::<Angles<Vec<TypeExpr>>>()?)
        } else {
            let name = s.parse_from::<Name>()?;
            if s.parse_if::<Dot>().is_some() {
                let ident = s.parse_from::<Name>()?;
                Self::UserDefined {
                    keyspace: Some(name),
                    name: ident,
                }
            } else if let Ok(native) = NativeType::from_str(&name) {
                Self::Native(native)
            } else {
                Self::UserDefined { keyspace: None, name }
            }
        })
    }
}

/// A single column definition inside `CREATE TABLE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: TypeExpr,
    pub static_column: bool,
    pub primary_key: bool,
}

impl Parse for ColumnDefinition {
    type Output = Self;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        let name = s.parse_from::<Name>()?;
        let data_type = s.parse::<TypeExpr>()?;
        let static_column = s.parse_if::<STATIC>().is_some();
        let primary_key = s.parse_if::<(PRIMARY, KEY)>().is_some();
        Ok(Self {
            name,
            data_type,
            static_column,
            primary_key,
        })
    }
}

/// The `PRIMARY KEY (...)` clause: a possibly composite partition key
/// followed by clustering columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKey {
    pub partition_key: Vec<String>,
    pub clustering_columns: Vec<String>,
}

impl Parse for PrimaryKey {
    type Output = Self;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        s.parse_from::<(PRIMARY, KEY, LeftParen)>()?;
        let partition_key = if s.check::<LeftParen>() {
            s.parse_from::<Parens<Vec<Name>>>()?
        } else {
            vec![s.parse_from::<Name>()?]
        };
        let mut clustering_columns = Vec::new();
        while s.parse_if::<Comma>().is_some() {
            clustering_columns.push(s.parse_from::<Name>()?);
        }
        s.parse_from::<RightParen>()?;
        Ok(Self {
            partition_key,
            clustering_columns,
        })
    }
}

/// A parsed `CREATE TABLE` fragment, reduced to what the schema model needs:
/// columns in definition order plus the partition and clustering key names.
/// Table options after `WITH` are consumed and discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTableStatement {
    pub keyspace: Option<String>,
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    pub partition_keys: Vec<String>,
    pub clustering_keys: Vec<String>,
}

impl Parse for CreateTableStatement {
    type Output = Self;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        s.parse_from::<(CREATE, TABLE)>()?;
        let if_not_exists = s.parse_from::<Option<(IF, NOT, EXISTS)>>()?.is_some();
        let first = s.parse_from::<Name>()?;
        let (keyspace, table) = if s.parse_if::<Dot>().is_some() {
            (Some(first), s.parse_from::<Name>()?)
        } else {
            (None, first)
        };
        s.parse_from::<LeftParen>()?;
        let mut columns: Vec<ColumnDefinition> = Vec::new();
        let mut primary_key: Option<PrimaryKey> = None;
        loop {
            if s.check::<(PRIMARY, KEY, LeftParen)>() {
                if primary_key.is_some() {
                    anyhow::bail!("Duplicate PRIMARY KEY clause");
                }
                primary_key = Some(s.parse::<PrimaryKey>()?);
            } else {
                columns.push(s.parse::<ColumnDefinition>()?);
            }
            if s.parse_if::<Comma>().is_some() {
                continue;
            }
            s.parse_from::<RightParen>()?;
            break;
        }
        // table options do not affect the schema model
        if s.parse_if::<WITH>().is_some() {
            while s.peek().is_some() && !s.check::<Semicolon>() {
                s.next();
            }
        }
        s.parse_from::<Option<Semicolon>>()?;

        let (partition_keys, clustering_keys) = match primary_key {
            Some(clause) => (clause.partition_key, clause.clustering_columns),
            None => {
                let inline: Vec<_> = columns
                    .iter()
                    .filter(|c| c.primary_key)
                    .map(|c| c.name.clone())
                    .collect();
                match inline.len() {
                    0 => anyhow::bail!("CREATE TABLE {} has no primary key", table),
                    1 => (inline, Vec::new()),
                    _ => anyhow::bail!("CREATE TABLE {} has multiple inline primary keys", table),
                }
            }
        };
        for key in partition_keys.iter().chain(clustering_keys.iter()) {
            if !columns.iter().any(|c| &c.name == key) {
                anyhow::bail!("Primary key column {} is not defined", key);
            }
        }
        Ok(Self {
            keyspace,
            table,
            if_not_exists,
            columns,
            partition_keys,
            clustering_keys,
        })
    }
}

impl FromStr for CreateTableStatement {
    type Err = anyhow::Error;

    fn from_str(statement: &str) -> anyhow::Result<Self> {
        let mut stream = StatementStream::new(statement);
        let parsed = stream.parse::<Self>()?;
        if !stream.at_end() {
            anyhow::bail!("Unexpected trailing content: {}", stream.info());
        }
        Ok(parsed)
    }
}

/// A parsed `CREATE TYPE` fragment: the raw type statement fed to the
/// schema builder's type registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTypeStatement {
    pub keyspace: Option<String>,
    pub name: String,
    pub if_not_exists: bool,
    pub fields: Vec<(String, TypeExpr)>,
}

impl CreateTypeStatement {
    /// The names of user defined types this type references.
    pub fn referenced_udts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (_, expr) in &self.fields {
            expr.referenced_udts(&mut out);
        }
        out
    }
}

struct FieldDefinition;

impl Parse for FieldDefinition {
    type Output = (String, TypeExpr);
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        let name = s.parse_from::<Name>()?;
        let data_type = s.parse::<TypeExpr>()?;
        Ok((name, data_type))
    }
}

impl Parse for CreateTypeStatement {
    type Output = Self;
    fn parse(s: &mut StatementStream<'_>) -> anyhow::Result<Self::Output> {
        s.parse_from::<(CREATE, TYPE)>()?;
        let if_not_exists = s.parse_from::<Option<(IF, NOT, EXISTS)>>()?.is_some();
        let first = s.parse_from::<Name>()?;
        let (keyspace, name) = if s.parse_if::<Dot>().is_some() {
            (Some(first), s.parse_from::<Name>()?)
        } else {
            (None, first)
        };
        let fields = s.parse_from::<Parens<Vec<FieldDefinition>>>()?;
        if fields.is_empty() {
            anyhow::bail!("CREATE TYPE {} has no fields", name);
        }
        s.parse_from::<Option<Semicolon>>()?;
        Ok(Self {
            keyspace,
            name,
            if_not_exists,
            fields,
        })
    }
}

impl FromStr for CreateTypeStatement {
    type Err = anyhow::Error;

    fn from_str(statement: &str) -> anyhow::Result<Self> {
        let mut stream = StatementStream::new(statement);
        let parsed = stream.parse::<Self>()?;
        if !stream.at_end() {
            anyhow::bail!("Unexpected trailing content: {}", stream.info());
        }
        Ok(parsed)
    }
}
