//! JMX OpenType bridge
//!
//! Models the open data types a JMX agent can carry (simple types, arrays,
//! `CompositeData`, `TabularData`) and bridges canonical values to them.
//!
//! Declared precision limitation: `java.util.Date` has millisecond
//! resolution, so `UnixTime` values lose their sub-millisecond digits on
//! the way out. Every other canonical type round-trips exactly.

use std::collections::BTreeMap;
use std::fmt;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use super::TypeBridge;
use crate::error::TypeError;
use crate::types::{
    convert, AttributeValue, CanonicalType, Column, MapType, MapValue, TableType, Value,
};

// ============================================================================
// Open types
// ============================================================================

/// The simple open types, one per boxed Java class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigDecimal,
    BigInteger,
    Date,
    Character,
    String,
}

impl SimpleType {
    pub fn class_name(&self) -> &'static str {
        match self {
            SimpleType::Boolean => "java.lang.Boolean",
            SimpleType::Byte => "java.lang.Byte",
            SimpleType::Short => "java.lang.Short",
            SimpleType::Integer => "java.lang.Integer",
            SimpleType::Long => "java.lang.Long",
            SimpleType::Float => "java.lang.Float",
            SimpleType::Double => "java.lang.Double",
            SimpleType::BigDecimal => "java.math.BigDecimal",
            SimpleType::BigInteger => "java.math.BigInteger",
            SimpleType::Date => "java.util.Date",
            SimpleType::Character => "java.lang.Character",
            SimpleType::String => "java.lang.String",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenType {
    Simple(SimpleType),
    Array(Box<OpenType>),
    Composite(CompositeType),
    Tabular(TabularType),
}

impl OpenType {
    /// Number of array dimensions, zero for non-array types.
    pub fn dimension(&self) -> usize {
        match self {
            OpenType::Array(element) => 1 + element.dimension(),
            _ => 0,
        }
    }

    /// Class name as an MBean attribute descriptor reports it.
    pub fn class_name(&self) -> String {
        match self {
            OpenType::Simple(simple) => simple.class_name().to_string(),
            OpenType::Array(element) => {
                let mut base = element.as_ref();
                while let OpenType::Array(inner) = base {
                    base = inner;
                }
                format!("{}{}", "[".repeat(self.dimension()), array_class_suffix(base))
            }
            OpenType::Composite(_) => "javax.management.openmbean.CompositeData".to_string(),
            OpenType::Tabular(_) => "javax.management.openmbean.TabularData".to_string(),
        }
    }
}

fn array_class_suffix(base: &OpenType) -> String {
    format!("L{};", base.class_name())
}

impl fmt::Display for OpenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenType::Simple(simple) => write!(f, "{}", simple.class_name()),
            OpenType::Array(element) => write!(f, "{}[]", element),
            OpenType::Composite(composite) => write!(f, "composite<{}>", composite.type_name),
            OpenType::Tabular(tabular) => write!(f, "tabular<{}>", tabular.type_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeItem {
    pub name: String,
    pub description: String,
    pub open_type: OpenType,
}

/// Named record type; item order follows the source column order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub type_name: String,
    pub description: String,
    pub items: Vec<CompositeItem>,
}

impl CompositeType {
    pub fn item(&self, name: &str) -> Option<&CompositeItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.item(name).is_some()
    }
}

/// Row type plus the names of the columns that index the table.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularType {
    pub type_name: String,
    pub description: String,
    pub row_type: CompositeType,
    pub index_names: Vec<String>,
}

// ============================================================================
// Open values
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OpenValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigDecimal(BigDecimal),
    BigInteger(BigInt),
    Date(DateTime<Utc>),
    Character(char),
    String(String),
    Array(OpenArray),
    Composite(CompositeData),
    Tabular(TabularData),
}

impl OpenValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OpenValue::Float(v) => Some(*v),
            OpenValue::Double(v) => Some(*v as f32),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            OpenValue::Boolean(_) => "Boolean",
            OpenValue::Byte(_) => "Byte",
            OpenValue::Short(_) => "Short",
            OpenValue::Integer(_) => "Integer",
            OpenValue::Long(_) => "Long",
            OpenValue::Float(_) => "Float",
            OpenValue::Double(_) => "Double",
            OpenValue::BigDecimal(_) => "BigDecimal",
            OpenValue::BigInteger(_) => "BigInteger",
            OpenValue::Date(_) => "Date",
            OpenValue::Character(_) => "Character",
            OpenValue::String(_) => "String",
            OpenValue::Array(_) => "array",
            OpenValue::Composite(_) => "CompositeData",
            OpenValue::Tabular(_) => "TabularData",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenArray {
    pub element_type: OpenType,
    pub items: Vec<OpenValue>,
}

/// A record whose key set is exactly its type's item names. Items the
/// source record leaves out are carried as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeData {
    composite_type: CompositeType,
    values: BTreeMap<String, Option<OpenValue>>,
}

impl CompositeData {
    pub fn new(
        composite_type: CompositeType,
        values: BTreeMap<String, Option<OpenValue>>,
    ) -> Result<Self, TypeError> {
        for key in values.keys() {
            if !composite_type.contains(key) {
                return Err(TypeError::schema(format!(
                    "'{}' is not an item of {}",
                    key, composite_type.type_name
                )));
            }
        }
        if let Some(item) = composite_type
            .items
            .iter()
            .find(|item| !values.contains_key(&item.name))
        {
            return Err(TypeError::schema(format!(
                "item '{}' of {} has no value",
                item.name, composite_type.type_name
            )));
        }
        Ok(Self {
            composite_type,
            values,
        })
    }

    pub fn composite_type(&self) -> &CompositeType {
        &self.composite_type
    }

    pub fn get(&self, name: &str) -> Option<&OpenValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabularData {
    tabular_type: TabularType,
    rows: Vec<CompositeData>,
}

impl TabularData {
    pub fn new(tabular_type: TabularType, rows: Vec<CompositeData>) -> Self {
        Self { tabular_type, rows }
    }

    pub fn tabular_type(&self) -> &TabularType {
        &self.tabular_type
    }

    pub fn rows(&self) -> &[CompositeData] {
        &self.rows
    }

    /// Index values of one row, in index-name order.
    pub fn index_of(&self, row: &CompositeData) -> Vec<Option<OpenValue>> {
        self.tabular_type
            .index_names
            .iter()
            .map(|name| row.get(name).cloned())
            .collect()
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Map a canonical type to the open type the bridge renders it as.
pub fn open_type_of(ty: &CanonicalType) -> OpenType {
    match ty {
        CanonicalType::Boolean => OpenType::Simple(SimpleType::Boolean),
        CanonicalType::Int8 => OpenType::Simple(SimpleType::Byte),
        CanonicalType::Int16 => OpenType::Simple(SimpleType::Short),
        CanonicalType::Int32 => OpenType::Simple(SimpleType::Integer),
        CanonicalType::Int64 => OpenType::Simple(SimpleType::Long),
        CanonicalType::Float32 => OpenType::Simple(SimpleType::Float),
        CanonicalType::Float64 => OpenType::Simple(SimpleType::Double),
        CanonicalType::Decimal => OpenType::Simple(SimpleType::BigDecimal),
        CanonicalType::BigInteger => OpenType::Simple(SimpleType::BigInteger),
        CanonicalType::UnixTime => OpenType::Simple(SimpleType::Date),
        CanonicalType::Character => OpenType::Simple(SimpleType::Character),
        CanonicalType::String => OpenType::Simple(SimpleType::String),
        CanonicalType::Array { element } => OpenType::Array(Box::new(open_type_of(element))),
        CanonicalType::Map(map) => OpenType::Composite(composite_type_of(map)),
        CanonicalType::Table(table) => OpenType::Tabular(tabular_type_of(table)),
    }
}

fn composite_items(columns: &[Column]) -> Vec<CompositeItem> {
    columns
        .iter()
        .map(|column| CompositeItem {
            name: column.name().to_string(),
            description: column.description().unwrap_or(column.name()).to_string(),
            open_type: open_type_of(column.canonical_type()),
        })
        .collect()
}

pub fn composite_type_of(map: &MapType) -> CompositeType {
    CompositeType {
        type_name: map.type_name().to_string(),
        description: map.description().unwrap_or(map.type_name()).to_string(),
        items: composite_items(map.columns()),
    }
}

/// Open tabular types need a non-empty index; a table declared without one
/// is indexed by all of its required columns.
pub fn tabular_type_of(table: &TableType) -> TabularType {
    let index_names = if table.index().is_empty() {
        let required: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !c.is_optional())
            .map(|c| c.name().to_string())
            .collect();
        if required.is_empty() {
            table.columns().iter().map(|c| c.name().to_string()).collect()
        } else {
            required
        }
    } else {
        table.index().to_vec()
    };
    let row = table.row_type();
    TabularType {
        type_name: table.type_name().to_string(),
        description: table.description().unwrap_or(table.type_name()).to_string(),
        row_type: composite_type_of(&row),
        index_names,
    }
}

/// Stateless OpenType bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenTypeBridge;

impl OpenTypeBridge {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, value: &Value, ty: &CanonicalType) -> Result<OpenValue, TypeError> {
        Ok(match (value, ty) {
            (Value::Boolean(v), _) => OpenValue::Boolean(*v),
            (Value::Int8(v), _) => OpenValue::Byte(*v),
            (Value::Int16(v), _) => OpenValue::Short(*v),
            (Value::Int32(v), _) => OpenValue::Integer(*v),
            (Value::Int64(v), _) => OpenValue::Long(*v),
            (Value::Float32(v), _) => OpenValue::Float(*v),
            (Value::Float64(v), _) => OpenValue::Double(*v),
            (Value::Decimal(v), _) => OpenValue::BigDecimal(v.clone()),
            (Value::BigInteger(v), _) => OpenValue::BigInteger(v.clone()),
            (Value::UnixTime(t), _) => OpenValue::Date(truncate_to_millis(t)?),
            (Value::Character(v), _) => OpenValue::Character(*v),
            (Value::String(v), _) => OpenValue::String(v.clone()),
            (Value::Array(items), CanonicalType::Array { element }) => OpenValue::Array(OpenArray {
                element_type: open_type_of(element),
                items: items
                    .iter()
                    .map(|item| self.render(item, element))
                    .collect::<Result<_, _>>()?,
            }),
            (Value::Map(record), CanonicalType::Map(schema)) => {
                OpenValue::Composite(self.render_record(
                    record,
                    composite_type_of(schema),
                    schema.columns(),
                )?)
            }
            (Value::Table(rows), CanonicalType::Table(schema)) => {
                let tabular_type = tabular_type_of(schema);
                let rows = rows
                    .iter()
                    .map(|row| {
                        self.render_record(row, tabular_type.row_type.clone(), schema.columns())
                    })
                    .collect::<Result<_, _>>()?;
                OpenValue::Tabular(TabularData::new(tabular_type, rows))
            }
            (value, ty) => {
                return Err(TypeError::invalid(format!(
                    "expected {}, got {}",
                    ty,
                    value.kind_name()
                )))
            }
        })
    }

    fn render_record(
        &self,
        record: &MapValue,
        composite_type: CompositeType,
        columns: &[Column],
    ) -> Result<CompositeData, TypeError> {
        let mut values = BTreeMap::new();
        for column in columns {
            let value = match record.get(column.name()) {
                Some(value) => Some(self.render(value, column.canonical_type())?),
                None => None,
            };
            values.insert(column.name().to_string(), value);
        }
        CompositeData::new(composite_type, values)
    }

    fn parse(&self, wire: &OpenValue, ty: &CanonicalType) -> Result<Value, TypeError> {
        match (wire, ty) {
            (OpenValue::Array(array), CanonicalType::Array { element }) => array
                .items
                .iter()
                .map(|item| self.parse(item, element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (OpenValue::Composite(data), CanonicalType::Map(schema)) => {
                self.parse_record(data, schema.columns()).map(Value::Map)
            }
            (OpenValue::Tabular(data), CanonicalType::Table(schema)) => data
                .rows()
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    self.parse_record(row, schema.columns()).map_err(|e| match e {
                        TypeError::SchemaMismatch(m) => {
                            TypeError::SchemaMismatch(format!("row {}: {}", i, m))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Table),
            (wire, ty) if ty.is_scalar() => match simple_value(wire) {
                Some(value) => convert(&value, ty),
                None => Err(TypeError::invalid(format!(
                    "{} cannot be read as {}",
                    wire.kind_name(),
                    ty
                ))),
            },
            (wire, ty) => Err(TypeError::invalid(format!(
                "{} cannot be read as {}",
                wire.kind_name(),
                ty
            ))),
        }
    }

    fn parse_record(
        &self,
        data: &CompositeData,
        columns: &[Column],
    ) -> Result<MapValue, TypeError> {
        for key in data.keys() {
            if !columns.iter().any(|c| c.name() == key) {
                return Err(TypeError::schema(format!("unexpected item '{}'", key)));
            }
        }
        let mut record = MapValue::new();
        for column in columns {
            match data.get(column.name()) {
                Some(value) => {
                    record.insert(column.name(), self.parse(value, column.canonical_type())?);
                }
                None if column.is_optional() => {}
                None => {
                    return Err(TypeError::schema(format!(
                        "missing item '{}'",
                        column.name()
                    )))
                }
            }
        }
        Ok(record)
    }
}

impl TypeBridge for OpenTypeBridge {
    type Wire = OpenValue;

    fn name(&self) -> &'static str {
        "open_type"
    }

    fn to_wire(&self, value: &AttributeValue) -> Result<OpenValue, TypeError> {
        self.render(value.value(), value.canonical_type())
    }

    fn from_wire(&self, wire: &OpenValue, ty: &CanonicalType) -> Result<AttributeValue, TypeError> {
        let value = self.parse(wire, ty)?;
        AttributeValue::new(value, ty.clone())
    }

    fn precision_loss(&self, ty: &CanonicalType) -> Option<&'static str> {
        if contains_time(ty) {
            Some("java.util.Date has millisecond resolution; sub-millisecond digits are dropped")
        } else {
            None
        }
    }
}

fn contains_time(ty: &CanonicalType) -> bool {
    match ty {
        CanonicalType::UnixTime => true,
        CanonicalType::Array { element } => contains_time(element),
        CanonicalType::Map(map) => map.columns().iter().any(|c| contains_time(c.canonical_type())),
        CanonicalType::Table(table) => table
            .columns()
            .iter()
            .any(|c| contains_time(c.canonical_type())),
        _ => false,
    }
}

fn truncate_to_millis(time: &DateTime<Utc>) -> Result<DateTime<Utc>, TypeError> {
    DateTime::<Utc>::from_timestamp_millis(time.timestamp_millis())
        .ok_or_else(|| TypeError::invalid(format!("{} is out of date range", time)))
}

fn simple_value(wire: &OpenValue) -> Option<Value> {
    Some(match wire {
        OpenValue::Boolean(v) => Value::Boolean(*v),
        OpenValue::Byte(v) => Value::Int8(*v),
        OpenValue::Short(v) => Value::Int16(*v),
        OpenValue::Integer(v) => Value::Int32(*v),
        OpenValue::Long(v) => Value::Int64(*v),
        OpenValue::Float(v) => Value::Float32(*v),
        OpenValue::Double(v) => Value::Float64(*v),
        OpenValue::BigDecimal(v) => Value::Decimal(v.clone()),
        OpenValue::BigInteger(v) => Value::BigInteger(v.clone()),
        OpenValue::Date(v) => Value::UnixTime(*v),
        OpenValue::Character(v) => Value::Character(*v),
        OpenValue::String(v) => Value::String(v.clone()),
        OpenValue::Array(_) | OpenValue::Composite(_) | OpenValue::Tabular(_) => return None,
    })
}
