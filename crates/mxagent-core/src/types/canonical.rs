//! Canonical entity types
//!
//! Every attribute and notification attachment is described by exactly one
//! `CanonicalType`. Composite types (map, table) carry an ordered column
//! schema; they are validated on construction and never mutated afterwards.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::{MapValue, Value};
use crate::error::TypeError;

/// Protocol-neutral classification of a managed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    BigInteger,
    UnixTime,
    Character,
    String,
    Array { element: Box<CanonicalType> },
    Map(MapType),
    Table(TableType),
}

impl CanonicalType {
    pub fn array_of(element: CanonicalType) -> Self {
        CanonicalType::Array {
            element: Box::new(element),
        }
    }

    /// True for every variant that is not array, map or table.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            CanonicalType::Array { .. } | CanonicalType::Map(_) | CanonicalType::Table(_)
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            CanonicalType::Int8
                | CanonicalType::Int16
                | CanonicalType::Int32
                | CanonicalType::Int64
                | CanonicalType::BigInteger
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, CanonicalType::Float32 | CanonicalType::Float64)
    }

    /// The value a gateway renders when a read falls back (timeout, unknown
    /// identifier). Zero for numbers, empty for strings and collections.
    pub fn default_value(&self) -> Value {
        match self {
            CanonicalType::Boolean => Value::Boolean(false),
            CanonicalType::Int8 => Value::Int8(0),
            CanonicalType::Int16 => Value::Int16(0),
            CanonicalType::Int32 => Value::Int32(0),
            CanonicalType::Int64 => Value::Int64(0),
            CanonicalType::Float32 => Value::Float32(0.0),
            CanonicalType::Float64 => Value::Float64(0.0),
            CanonicalType::Decimal => Value::Decimal(Default::default()),
            CanonicalType::BigInteger => Value::BigInteger(Default::default()),
            CanonicalType::UnixTime => Value::UnixTime(DateTime::<Utc>::UNIX_EPOCH),
            CanonicalType::Character => Value::Character('\0'),
            CanonicalType::String => Value::String(String::new()),
            CanonicalType::Array { .. } => Value::Array(Vec::new()),
            CanonicalType::Map(map) => {
                // Only required columns get a default; optional ones stay absent.
                let entries = map
                    .columns()
                    .iter()
                    .filter(|c| !c.is_optional())
                    .map(|c| (c.name().to_string(), c.canonical_type().default_value()))
                    .collect();
                Value::Map(entries)
            }
            CanonicalType::Table(_) => Value::Table(Vec::new()),
        }
    }

    /// Verify that `value` has the runtime shape this type declares.
    pub fn check(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (CanonicalType::Boolean, Value::Boolean(_))
            | (CanonicalType::Int8, Value::Int8(_))
            | (CanonicalType::Int16, Value::Int16(_))
            | (CanonicalType::Int32, Value::Int32(_))
            | (CanonicalType::Int64, Value::Int64(_))
            | (CanonicalType::Float32, Value::Float32(_))
            | (CanonicalType::Float64, Value::Float64(_))
            | (CanonicalType::Decimal, Value::Decimal(_))
            | (CanonicalType::BigInteger, Value::BigInteger(_))
            | (CanonicalType::UnixTime, Value::UnixTime(_))
            | (CanonicalType::Character, Value::Character(_))
            | (CanonicalType::String, Value::String(_)) => Ok(()),
            (CanonicalType::Array { element }, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    element.check(item).map_err(|e| prefix_error(e, &format!("[{}]", i)))?;
                }
                Ok(())
            }
            (CanonicalType::Map(map), Value::Map(entries)) => map.check_record(entries),
            (CanonicalType::Table(table), Value::Table(rows)) => {
                for (i, row) in rows.iter().enumerate() {
                    table
                        .check_row(row)
                        .map_err(|e| prefix_error(e, &format!("row {}", i)))?;
                }
                Ok(())
            }
            (ty, value) => Err(TypeError::invalid(format!(
                "expected {}, got {}",
                ty,
                value.kind_name()
            ))),
        }
    }
}

fn prefix_error(error: TypeError, at: &str) -> TypeError {
    match error {
        TypeError::InvalidValue(m) => TypeError::InvalidValue(format!("{}: {}", at, m)),
        TypeError::SchemaMismatch(m) => TypeError::SchemaMismatch(format!("{}: {}", at, m)),
        other => other,
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalType::Boolean => write!(f, "boolean"),
            CanonicalType::Int8 => write!(f, "int8"),
            CanonicalType::Int16 => write!(f, "int16"),
            CanonicalType::Int32 => write!(f, "int32"),
            CanonicalType::Int64 => write!(f, "int64"),
            CanonicalType::Float32 => write!(f, "float32"),
            CanonicalType::Float64 => write!(f, "float64"),
            CanonicalType::Decimal => write!(f, "decimal"),
            CanonicalType::BigInteger => write!(f, "big_integer"),
            CanonicalType::UnixTime => write!(f, "unix_time"),
            CanonicalType::Character => write!(f, "character"),
            CanonicalType::String => write!(f, "string"),
            CanonicalType::Array { element } => write!(f, "array<{}>", element),
            CanonicalType::Map(map) => write!(f, "map<{}>", map.type_name()),
            CanonicalType::Table(table) => write!(f, "table<{}>", table.type_name()),
        }
    }
}

/// One named, typed column of a map or table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    name: String,
    #[serde(rename = "type")]
    ty: CanonicalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    optional: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: CanonicalType) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
            optional: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Optional columns may be absent from a record.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_type(&self) -> &CanonicalType {
        &self.ty
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

#[derive(Deserialize)]
struct MapTypeRepr {
    #[serde(default = "default_map_name")]
    type_name: String,
    #[serde(default)]
    description: Option<String>,
    columns: Vec<Column>,
}

fn default_map_name() -> String {
    "map".to_string()
}

/// Ordered column schema describing a keyed record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MapTypeRepr")]
pub struct MapType {
    type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    columns: Vec<Column>,
}

impl TryFrom<MapTypeRepr> for MapType {
    type Error = TypeError;

    fn try_from(repr: MapTypeRepr) -> Result<Self, Self::Error> {
        let mut map = MapType::new(repr.type_name, repr.columns)?;
        map.description = repr.description;
        Ok(map)
    }
}

impl MapType {
    /// Build a map schema. Column names must be non-empty and unique.
    pub fn new(type_name: impl Into<String>, columns: Vec<Column>) -> Result<Self, TypeError> {
        validate_columns(&columns)?;
        Ok(Self {
            type_name: type_name.into(),
            description: None,
            columns,
        })
    }

    /// Schema inferred from a runtime record; keys come from a map and are
    /// already unique.
    pub(crate) fn inferred(type_name: &str, columns: Vec<Column>) -> Self {
        Self {
            type_name: type_name.to_string(),
            description: None,
            columns,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Validate a record against the schema: no extra keys, every required
    /// column present, every present value of the declared column type.
    pub fn check_record(&self, record: &MapValue) -> Result<(), TypeError> {
        check_columns(&self.columns, record)
    }
}

#[derive(Deserialize)]
struct TableTypeRepr {
    #[serde(default = "default_table_name")]
    type_name: String,
    #[serde(default)]
    description: Option<String>,
    columns: Vec<Column>,
    #[serde(default)]
    index: Vec<String>,
}

fn default_table_name() -> String {
    "table".to_string()
}

/// Row schema plus the indexed (primary-key-like) column names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TableTypeRepr")]
pub struct TableType {
    type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    columns: Vec<Column>,
    index: Vec<String>,
}

impl TryFrom<TableTypeRepr> for TableType {
    type Error = TypeError;

    fn try_from(repr: TableTypeRepr) -> Result<Self, Self::Error> {
        let mut table = TableType::new(repr.type_name, repr.columns, repr.index)?;
        table.description = repr.description;
        Ok(table)
    }
}

impl TableType {
    /// Build a table schema. Indexed names must refer to required columns.
    pub fn new(
        type_name: impl Into<String>,
        columns: Vec<Column>,
        index: Vec<String>,
    ) -> Result<Self, TypeError> {
        validate_columns(&columns)?;
        for name in &index {
            match columns.iter().find(|c| &c.name == name) {
                Some(column) if column.optional => {
                    return Err(TypeError::schema(format!(
                        "indexed column '{}' cannot be optional",
                        name
                    )))
                }
                Some(_) => {}
                None => {
                    return Err(TypeError::schema(format!(
                        "indexed column '{}' is not declared",
                        name
                    )))
                }
            }
        }
        Ok(Self {
            type_name: type_name.into(),
            description: None,
            columns,
            index,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn inferred(type_name: &str, columns: Vec<Column>) -> Self {
        Self {
            type_name: type_name.to_string(),
            description: None,
            columns,
            index: Vec::new(),
        }
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// The schema of a single row, as a map type.
    pub fn row_type(&self) -> MapType {
        MapType {
            type_name: format!("{}.row", self.type_name),
            description: self.description.clone(),
            columns: self.columns.clone(),
        }
    }

    pub fn check_row(&self, row: &MapValue) -> Result<(), TypeError> {
        check_columns(&self.columns, row)
    }
}

fn validate_columns(columns: &[Column]) -> Result<(), TypeError> {
    let mut seen = HashSet::new();
    for column in columns {
        if column.name.is_empty() {
            return Err(TypeError::schema("column name must not be empty"));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(TypeError::schema(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
    }
    Ok(())
}

fn check_columns(columns: &[Column], record: &MapValue) -> Result<(), TypeError> {
    for key in record.keys() {
        if !columns.iter().any(|c| c.name == key) {
            return Err(TypeError::schema(format!("unexpected column '{}'", key)));
        }
    }
    for column in columns {
        match record.get(&column.name) {
            Some(value) => column
                .ty
                .check(value)
                .map_err(|e| prefix_error(e, &format!("column '{}'", column.name)))?,
            None if column.optional => {}
            None => {
                return Err(TypeError::schema(format!(
                    "missing column '{}'",
                    column.name
                )))
            }
        }
    }
    Ok(())
}
