//! Projections between canonical types
//!
//! A projection converts a value of one canonical type into another. Every
//! conversion is exact: narrowing that would change the value, dropping a
//! fractional part or sub-millisecond time component is a `TypeError`,
//! never a best-effort result.

use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use super::canonical::{CanonicalType, Column, MapType, TableType};
use super::value::{MapValue, Value};
use crate::error::TypeError;

/// Structural classification of a runtime value.
///
/// Scalars map to their own variant. Arrays take the element type of their
/// first item (string for empty arrays); maps and tables derive required
/// columns from their keys, tables without an index.
pub fn classify(value: &Value) -> CanonicalType {
    match value {
        Value::Boolean(_) => CanonicalType::Boolean,
        Value::Int8(_) => CanonicalType::Int8,
        Value::Int16(_) => CanonicalType::Int16,
        Value::Int32(_) => CanonicalType::Int32,
        Value::Int64(_) => CanonicalType::Int64,
        Value::Float32(_) => CanonicalType::Float32,
        Value::Float64(_) => CanonicalType::Float64,
        Value::Decimal(_) => CanonicalType::Decimal,
        Value::BigInteger(_) => CanonicalType::BigInteger,
        Value::UnixTime(_) => CanonicalType::UnixTime,
        Value::Character(_) => CanonicalType::Character,
        Value::String(_) => CanonicalType::String,
        Value::Array(items) => CanonicalType::array_of(
            items
                .first()
                .map(classify)
                .unwrap_or(CanonicalType::String),
        ),
        Value::Map(map) => CanonicalType::Map(MapType::inferred("map", infer_columns(map))),
        Value::Table(rows) => {
            let columns = rows.first().map(infer_columns).unwrap_or_default();
            CanonicalType::Table(TableType::inferred("table", columns))
        }
    }
}

fn infer_columns(map: &MapValue) -> Vec<Column> {
    map.iter()
        .map(|(name, value)| Column::new(name, classify(value)))
        .collect()
}

/// Whether a projection from `from` to `to` exists at all.
///
/// Existence is a property of the types; an individual value may still be
/// rejected by [`convert`] when it is out of range for the target.
pub fn projection_exists(from: &CanonicalType, to: &CanonicalType) -> bool {
    use CanonicalType as T;

    if from == to {
        return true;
    }
    match (from, to) {
        (T::Array { element: a }, T::Array { element: b }) => projection_exists(a, b),
        (T::Map(a), T::Map(b)) => columns_projectable(a.columns(), b.columns()),
        (T::Table(a), T::Table(b)) => columns_projectable(a.columns(), b.columns()),
        (f, t) if !f.is_scalar() || !t.is_scalar() => false,
        // Every scalar renders to and parses from text.
        (_, T::String) | (T::String, _) => true,
        (f, t) if is_numeric(f) && is_numeric(t) => true,
        (T::Character, _) | (_, T::Character) => false,
        (T::UnixTime, T::Int64) | (T::Int64, T::UnixTime) => true,
        _ => false,
    }
}

fn is_numeric(ty: &CanonicalType) -> bool {
    ty.is_integral() || ty.is_floating() || matches!(ty, CanonicalType::Decimal)
}

fn columns_projectable(from: &[Column], to: &[Column]) -> bool {
    to.iter().all(|target| match from.iter().find(|c| c.name() == target.name()) {
        Some(source) => projection_exists(source.canonical_type(), target.canonical_type()),
        None => target.is_optional(),
    })
}

/// Convert `value` into the representation of `target`.
pub fn convert(value: &Value, target: &CanonicalType) -> Result<Value, TypeError> {
    let converted = convert_unchecked(value, target)?;
    target.check(&converted)?;
    Ok(converted)
}

fn convert_unchecked(value: &Value, target: &CanonicalType) -> Result<Value, TypeError> {
    use CanonicalType as T;

    match (value, target) {
        (Value::Array(items), T::Array { element }) => items
            .iter()
            .map(|item| convert(item, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Value::Map(map), T::Map(schema)) => {
            convert_record(map, schema.columns()).map(Value::Map)
        }
        (Value::Table(rows), T::Table(schema)) => rows
            .iter()
            .map(|row| convert_record(row, schema.columns()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Table),
        (Value::String(text), t) if t.is_scalar() => parse_text(text, t),
        (v, T::String) if is_scalar_value(v) => Ok(Value::String(v.to_string())),
        (Value::Character(c), T::Character) => Ok(Value::Character(*c)),
        (Value::Boolean(b), T::Boolean) => Ok(Value::Boolean(*b)),
        (Value::UnixTime(t), T::UnixTime) => Ok(Value::UnixTime(*t)),
        (Value::UnixTime(t), T::Int64) => time_to_millis(t).map(Value::Int64),
        (Value::Int64(ms), T::UnixTime) => DateTime::<Utc>::from_timestamp_millis(*ms)
            .map(Value::UnixTime)
            .ok_or_else(|| TypeError::invalid(format!("{} ms is out of time range", ms))),
        (v, t) if is_numeric_value(v) && is_numeric(t) => convert_numeric(v, t),
        (v, t) => Err(TypeError::unsupported(v.kind_name(), t)),
    }
}

fn convert_record(record: &MapValue, columns: &[Column]) -> Result<MapValue, TypeError> {
    let mut out = MapValue::new();
    for key in record.keys() {
        if !columns.iter().any(|c| c.name() == key) {
            return Err(TypeError::schema(format!("unexpected column '{}'", key)));
        }
    }
    for column in columns {
        match record.get(column.name()) {
            Some(value) => {
                out.insert(column.name(), convert(value, column.canonical_type())?);
            }
            None if column.is_optional() => {}
            None => {
                return Err(TypeError::schema(format!(
                    "missing column '{}'",
                    column.name()
                )))
            }
        }
    }
    Ok(out)
}

fn is_scalar_value(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Map(_) | Value::Table(_))
}

fn is_numeric_value(value: &Value) -> bool {
    matches!(
        value,
        Value::Int8(_)
            | Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::BigInteger(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::Decimal(_)
    )
}

fn time_to_millis(time: &DateTime<Utc>) -> Result<i64, TypeError> {
    if time.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(TypeError::invalid(format!(
            "{} has sub-millisecond precision",
            time
        )));
    }
    Ok(time.timestamp_millis())
}

/// Exact numeric value used as the pivot for numeric conversions.
enum Number {
    Integer(BigInt),
    Float(f64),
    Decimal(BigDecimal),
}

fn to_number(value: &Value) -> Number {
    match value {
        Value::Int8(v) => Number::Integer(BigInt::from(*v)),
        Value::Int16(v) => Number::Integer(BigInt::from(*v)),
        Value::Int32(v) => Number::Integer(BigInt::from(*v)),
        Value::Int64(v) => Number::Integer(BigInt::from(*v)),
        Value::BigInteger(v) => Number::Integer(v.clone()),
        Value::Float32(v) => Number::Float(f64::from(*v)),
        Value::Float64(v) => Number::Float(*v),
        Value::Decimal(v) => Number::Decimal(v.clone()),
        _ => Number::Float(f64::NAN),
    }
}

fn convert_numeric(value: &Value, target: &CanonicalType) -> Result<Value, TypeError> {
    use CanonicalType as T;

    let number = to_number(value);
    let out_of_range = || TypeError::invalid(format!("{} is out of range for {}", value, target));

    match target {
        T::Int8 | T::Int16 | T::Int32 | T::Int64 | T::BigInteger => {
            let integer = match number {
                Number::Integer(i) => i,
                Number::Float(f) => float_to_integer(f)
                    .ok_or_else(|| TypeError::invalid(format!("{} is not an integer", value)))?,
                Number::Decimal(d) => {
                    if !d.is_integer() {
                        return Err(TypeError::invalid(format!("{} is not an integer", d)));
                    }
                    d.with_scale(0).into_bigint_and_exponent().0
                }
            };
            match target {
                T::Int8 => i8::try_from(&integer).map(Value::Int8).map_err(|_| out_of_range()),
                T::Int16 => i16::try_from(&integer).map(Value::Int16).map_err(|_| out_of_range()),
                T::Int32 => i32::try_from(&integer).map(Value::Int32).map_err(|_| out_of_range()),
                T::Int64 => i64::try_from(&integer).map(Value::Int64).map_err(|_| out_of_range()),
                _ => Ok(Value::BigInteger(integer)),
            }
        }
        T::Float64 => number_to_f64(&number, value).map(Value::Float64),
        T::Float32 => {
            let wide = number_to_f64(&number, value)?;
            let narrow = wide as f32;
            if wide.is_finite() && f64::from(narrow) != wide {
                return Err(TypeError::invalid(format!(
                    "{} cannot be represented exactly as float32",
                    value
                )));
            }
            Ok(Value::Float32(narrow))
        }
        T::Decimal => match number {
            Number::Integer(i) => Ok(Value::Decimal(BigDecimal::new(i, 0))),
            Number::Decimal(d) => Ok(Value::Decimal(d)),
            Number::Float(f) => float_to_decimal(f, value).map(Value::Decimal),
        },
        other => Err(TypeError::unsupported(value.kind_name(), other)),
    }
}

fn float_to_integer(f: f64) -> Option<BigInt> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    // Integral floats print without exponent or fraction only in range; go
    // through the decimal form to keep large magnitudes exact.
    let decimal = BigDecimal::from_str(&format!("{:.0}", f)).ok()?;
    Some(decimal.with_scale(0).into_bigint_and_exponent().0)
}

fn float_to_decimal(f: f64, original: &Value) -> Result<BigDecimal, TypeError> {
    if !f.is_finite() {
        return Err(TypeError::invalid(format!(
            "{} has no decimal representation",
            original
        )));
    }
    BigDecimal::from_str(&f.to_string()).map_err(|e| TypeError::invalid(e.to_string()))
}

fn number_to_f64(number: &Number, original: &Value) -> Result<f64, TypeError> {
    let inexact = || {
        TypeError::invalid(format!(
            "{} cannot be represented exactly as a binary float",
            original
        ))
    };
    match number {
        Number::Float(f) => Ok(*f),
        Number::Integer(i) => {
            let f: f64 = i.to_string().parse().map_err(|_| inexact())?;
            match float_to_integer(f) {
                Some(back) if &back == i => Ok(f),
                _ => Err(inexact()),
            }
        }
        Number::Decimal(d) => {
            let f: f64 = d.to_string().parse().map_err(|_| inexact())?;
            match BigDecimal::from_str(&f.to_string()) {
                Ok(back) if f.is_finite() && &back == d => Ok(f),
                _ => Err(inexact()),
            }
        }
    }
}

fn parse_text(text: &str, target: &CanonicalType) -> Result<Value, TypeError> {
    use CanonicalType as T;

    let bad = |e: &dyn std::fmt::Display| {
        TypeError::invalid(format!("cannot parse '{}' as {}: {}", text, target, e))
    };
    let trimmed = text.trim();
    match target {
        T::String => Ok(Value::String(text.to_string())),
        T::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(bad(&"expected true or false")),
        },
        T::Int8 => trimmed.parse().map(Value::Int8).map_err(|e| bad(&e)),
        T::Int16 => trimmed.parse().map(Value::Int16).map_err(|e| bad(&e)),
        T::Int32 => trimmed.parse().map(Value::Int32).map_err(|e| bad(&e)),
        T::Int64 => trimmed.parse().map(Value::Int64).map_err(|e| bad(&e)),
        T::Float32 => trimmed.parse().map(Value::Float32).map_err(|e| bad(&e)),
        T::Float64 => trimmed.parse().map(Value::Float64).map_err(|e| bad(&e)),
        T::Decimal => BigDecimal::from_str(trimmed)
            .map(Value::Decimal)
            .map_err(|e| bad(&e)),
        T::BigInteger => BigInt::from_str(trimmed)
            .map(Value::BigInteger)
            .map_err(|e| bad(&e)),
        T::UnixTime => DateTime::parse_from_rfc3339(trimmed)
            .map(|t| Value::UnixTime(t.with_timezone(&Utc)))
            .map_err(|e| bad(&e)),
        T::Character => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Character(c)),
                _ => Err(bad(&"expected exactly one character")),
            }
        }
        other => Err(TypeError::unsupported("string", other)),
    }
}
