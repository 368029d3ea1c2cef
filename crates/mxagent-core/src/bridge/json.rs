//! JSON bridge
//!
//! Renders canonical values as `serde_json::Value` for the REST and command
//! gateways, and parses JSON back against a declared canonical type.
//!
//! Rendering rules:
//! - `Decimal` is a JSON string so arbitrary precision survives
//! - `BigInteger` is a number when it fits 64 bits, a string otherwise
//! - non-finite floats are the strings `"NaN"`, `"Infinity"`, `"-Infinity"`
//! - `UnixTime` is an RFC 3339 string in UTC with the full sub-second part
//! - maps are objects in column order, tables are arrays of row objects

use bigdecimal::num_bigint::BigInt;
use chrono::SecondsFormat;
use serde_json::{Map as JsonMap, Number, Value as Json};

use super::TypeBridge;
use crate::error::TypeError;
use crate::types::{
    convert, AttributeValue, CanonicalType, Column, MapType, MapValue, TableType, Value,
};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Stateless JSON type bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBridge;

impl JsonBridge {
    pub fn new() -> Self {
        Self
    }

    /// Classify an untyped JSON value.
    ///
    /// Integral numbers take the narrowest of int8, int16, int32, int64,
    /// then big-integer. Fractional numbers become float32 when the value
    /// is exactly representable in single precision, float64 otherwise;
    /// decimal is never inferred because a parsed JSON number already went
    /// through binary floating point. RFC 3339 strings classify as
    /// unix-time, every other string as string, so character is never
    /// inferred. Arrays take their first element's type, objects become a
    /// map of required columns, and table is never inferred since array
    /// wins first.
    pub fn classify(&self, json: &Json) -> Result<CanonicalType, TypeError> {
        match json {
            Json::Null => Err(TypeError::invalid("null has no canonical type")),
            Json::Bool(_) => Ok(CanonicalType::Boolean),
            Json::Number(n) => Ok(classify_number(n)),
            Json::String(s) => {
                if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                    Ok(CanonicalType::UnixTime)
                } else {
                    Ok(CanonicalType::String)
                }
            }
            Json::Array(items) => {
                let element = match items.first() {
                    Some(first) => self.classify(first)?,
                    None => CanonicalType::String,
                };
                Ok(CanonicalType::array_of(element))
            }
            Json::Object(fields) => {
                let columns = fields
                    .iter()
                    .map(|(k, v)| Ok(Column::new(k.clone(), self.classify(v)?)))
                    .collect::<Result<Vec<_>, TypeError>>()?;
                Ok(CanonicalType::Map(MapType::new("json", columns)?))
            }
        }
    }

    /// Parse JSON whose type is not declared anywhere, using [`classify`](Self::classify).
    pub fn from_untyped(&self, json: &Json) -> Result<AttributeValue, TypeError> {
        let ty = self.classify(json)?;
        self.from_wire(json, &ty)
    }

    fn render(&self, value: &Value, ty: &CanonicalType) -> Result<Json, TypeError> {
        Ok(match (value, ty) {
            (Value::Boolean(b), _) => Json::Bool(*b),
            (Value::Int8(v), _) => Json::from(*v),
            (Value::Int16(v), _) => Json::from(*v),
            (Value::Int32(v), _) => Json::from(*v),
            (Value::Int64(v), _) => Json::from(*v),
            (Value::Float32(v), _) => render_float(f64::from(*v)),
            (Value::Float64(v), _) => render_float(*v),
            (Value::Decimal(d), _) => Json::String(d.to_string()),
            (Value::BigInteger(i), _) => render_big_integer(i),
            (Value::UnixTime(t), _) => {
                Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            (Value::Character(c), _) => Json::String(c.to_string()),
            (Value::String(s), _) => Json::String(s.clone()),
            (Value::Array(items), CanonicalType::Array { element }) => Json::Array(
                items
                    .iter()
                    .map(|item| self.render(item, element))
                    .collect::<Result<_, _>>()?,
            ),
            (Value::Map(record), CanonicalType::Map(schema)) => {
                self.render_record(record, schema.columns())?
            }
            (Value::Table(rows), CanonicalType::Table(schema)) => Json::Array(
                rows.iter()
                    .map(|row| self.render_record(row, schema.columns()))
                    .collect::<Result<_, _>>()?,
            ),
            (value, ty) => {
                return Err(TypeError::invalid(format!(
                    "expected {}, got {}",
                    ty,
                    value.kind_name()
                )))
            }
        })
    }

    fn render_record(&self, record: &MapValue, columns: &[Column]) -> Result<Json, TypeError> {
        let mut object = JsonMap::new();
        for column in columns {
            if let Some(value) = record.get(column.name()) {
                object.insert(
                    column.name().to_string(),
                    self.render(value, column.canonical_type())?,
                );
            }
        }
        Ok(Json::Object(object))
    }

    fn parse(&self, json: &Json, ty: &CanonicalType) -> Result<Value, TypeError> {
        match (json, ty) {
            (Json::Null, ty) => Err(TypeError::invalid(format!("null is not a valid {}", ty))),
            (Json::Array(items), CanonicalType::Array { element }) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.parse(item, element)
                        .map_err(|e| at(e, &format!("[{}]", i)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Json::Object(fields), CanonicalType::Map(schema)) => {
                self.parse_record(fields, schema.columns()).map(Value::Map)
            }
            (Json::Array(rows), CanonicalType::Table(schema)) => {
                self.parse_rows(rows, schema).map(Value::Table)
            }
            (Json::String(s), ty) if ty.is_floating() => match s.as_str() {
                NAN => float_value(f64::NAN, ty),
                INFINITY => float_value(f64::INFINITY, ty),
                NEG_INFINITY => float_value(f64::NEG_INFINITY, ty),
                other => convert(&Value::String(other.to_string()), ty),
            },
            // Text is parsed against the declared type directly, never
            // reclassified: a date-shaped string stays a string.
            (Json::String(s), ty) if ty.is_scalar() => convert(&Value::String(s.clone()), ty),
            (Json::Bool(b), ty) if ty.is_scalar() => convert(&Value::Boolean(*b), ty),
            (Json::Number(n), ty) if ty.is_scalar() => convert(&number_value(n), ty),
            (json, ty) => Err(TypeError::invalid(format!(
                "JSON {} cannot be read as {}",
                json_kind(json),
                ty
            ))),
        }
    }

    fn parse_record(
        &self,
        fields: &JsonMap<String, Json>,
        columns: &[Column],
    ) -> Result<MapValue, TypeError> {
        for key in fields.keys() {
            if !columns.iter().any(|c| c.name() == key) {
                return Err(TypeError::schema(format!("unexpected column '{}'", key)));
            }
        }
        let mut record = MapValue::new();
        for column in columns {
            match fields.get(column.name()) {
                Some(Json::Null) | None if column.is_optional() => {}
                Some(json) => {
                    let value = self
                        .parse(json, column.canonical_type())
                        .map_err(|e| at(e, &format!("column '{}'", column.name())))?;
                    record.insert(column.name(), value);
                }
                None => {
                    return Err(TypeError::schema(format!(
                        "missing column '{}'",
                        column.name()
                    )))
                }
            }
        }
        Ok(record)
    }

    fn parse_rows(&self, rows: &[Json], schema: &TableType) -> Result<Vec<MapValue>, TypeError> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| match row {
                Json::Object(fields) => self
                    .parse_record(fields, schema.columns())
                    .map_err(|e| at(e, &format!("row {}", i))),
                other => Err(TypeError::schema(format!(
                    "row {} is a JSON {}, expected an object",
                    i,
                    json_kind(other)
                ))),
            })
            .collect()
    }
}

impl TypeBridge for JsonBridge {
    type Wire = Json;

    fn name(&self) -> &'static str {
        "json"
    }

    fn to_wire(&self, value: &AttributeValue) -> Result<Json, TypeError> {
        self.render(value.value(), value.canonical_type())
    }

    fn from_wire(&self, wire: &Json, ty: &CanonicalType) -> Result<AttributeValue, TypeError> {
        let value = self.parse(wire, ty)?;
        AttributeValue::new(value, ty.clone())
    }
}

fn classify_number(n: &Number) -> CanonicalType {
    if let Some(i) = n.as_i64() {
        return if i8::try_from(i).is_ok() {
            CanonicalType::Int8
        } else if i16::try_from(i).is_ok() {
            CanonicalType::Int16
        } else if i32::try_from(i).is_ok() {
            CanonicalType::Int32
        } else {
            CanonicalType::Int64
        };
    }
    if n.is_u64() {
        return CanonicalType::BigInteger;
    }
    match n.as_f64() {
        Some(f) if f64::from(f as f32) == f => CanonicalType::Float32,
        _ => CanonicalType::Float64,
    }
}

fn number_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int64(i)
    } else if let Some(u) = n.as_u64() {
        Value::BigInteger(BigInt::from(u))
    } else {
        Value::Float64(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn float_value(f: f64, ty: &CanonicalType) -> Result<Value, TypeError> {
    match ty {
        CanonicalType::Float32 => Ok(Value::Float32(f as f32)),
        _ => Ok(Value::Float64(f)),
    }
}

fn render_float(f: f64) -> Json {
    if f.is_nan() {
        Json::String(NAN.to_string())
    } else if f.is_infinite() {
        let text = if f > 0.0 { INFINITY } else { NEG_INFINITY };
        Json::String(text.to_string())
    } else {
        Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(f.to_string()))
    }
}

fn render_big_integer(i: &BigInt) -> Json {
    if let Ok(v) = i64::try_from(i) {
        Json::from(v)
    } else if let Ok(v) = u64::try_from(i) {
        Json::from(v)
    } else {
        Json::String(i.to_string())
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn at(error: TypeError, location: &str) -> TypeError {
    match error {
        TypeError::InvalidValue(m) => TypeError::InvalidValue(format!("{}: {}", location, m)),
        TypeError::SchemaMismatch(m) => TypeError::SchemaMismatch(format!("{}: {}", location, m)),
        other => other,
    }
}

/// Parse a JSON body that was sent as text, such as the `-v` argument of
/// the command gateway. Bare words that are not valid JSON are taken as
/// JSON strings.
pub fn parse_lenient(text: &str) -> Json {
    serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_string()))
}
