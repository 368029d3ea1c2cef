//! JSON and OpenType renderings of the same canonical values

use std::str::FromStr;

use bigdecimal::BigDecimal;
use mxagent_core::bridge::{OpenTypeBridge, OpenValue};
use mxagent_core::types::convert;
use mxagent_core::{
    AttributeValue, CanonicalType, Column, JsonBridge, TableType, TypeBridge, TypeError, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn threads() -> CanonicalType {
    CanonicalType::Table(
        TableType::new(
            "threads",
            vec![
                Column::new("id", CanonicalType::Int64),
                Column::new("name", CanonicalType::String),
                Column::new("cpu", CanonicalType::Float64).optional(),
            ],
            vec!["id".to_string()],
        )
        .unwrap(),
    )
}

#[test]
fn cpu_load_is_a_number_in_json_and_a_float_field_in_open_type() {
    let value = AttributeValue::scalar(0.73f64).unwrap();

    assert_eq!(JsonBridge.to_wire(&value).unwrap(), json!(0.73));

    let open = OpenTypeBridge.to_wire(&value).unwrap();
    assert_eq!(open, OpenValue::Double(0.73));
    assert_eq!(open.as_f32(), Some(0.73f32));
}

#[test]
fn json_table_reaches_open_type_with_its_index() {
    let wire = json!([
        { "id": 1, "name": "main", "cpu": 0.5 },
        { "id": 2, "name": "worker" }
    ]);
    let ty = threads();
    let value = JsonBridge.from_wire(&wire, &ty).unwrap();

    let open = OpenTypeBridge.to_wire(&value).unwrap();
    let OpenValue::Tabular(data) = &open else {
        panic!("expected tabular data, got {:?}", open);
    };
    assert_eq!(data.tabular_type().index_names, vec!["id".to_string()]);
    assert_eq!(data.rows().len(), 2);
    assert_eq!(data.rows()[1].get("cpu"), None);
    assert_eq!(data.index_of(&data.rows()[0]), vec![Some(OpenValue::Long(1))]);

    let back = OpenTypeBridge.from_wire(&open, &ty).unwrap();
    assert_eq!(JsonBridge.to_wire(&back).unwrap(), wire);
}

#[test]
fn decimal_precision_survives_both_bridges() {
    let digits = "3.14159265358979323846264338327950288";
    let value = JsonBridge
        .from_wire(&json!(digits), &CanonicalType::Decimal)
        .unwrap();

    let open = OpenTypeBridge.to_wire(&value).unwrap();
    assert_eq!(
        open,
        OpenValue::BigDecimal(BigDecimal::from_str(digits).unwrap())
    );
    let back = OpenTypeBridge.from_wire(&open, &CanonicalType::Decimal).unwrap();
    assert_eq!(JsonBridge.to_wire(&back).unwrap(), json!(digits));
}

#[test]
fn schema_violations_are_rejected_not_coerced() {
    let ty = threads();
    let extra = json!([{ "id": 1, "name": "main", "owner": "root" }]);
    assert!(matches!(
        JsonBridge.from_wire(&extra, &ty),
        Err(TypeError::SchemaMismatch(_))
    ));

    let missing = json!([{ "name": "main" }]);
    assert!(matches!(
        JsonBridge.from_wire(&missing, &ty),
        Err(TypeError::SchemaMismatch(_))
    ));

    assert!(JsonBridge
        .from_wire(&json!(300), &CanonicalType::Int8)
        .is_err());
}

#[test]
fn projections_are_exact_or_fail() {
    assert_eq!(
        convert(&Value::Int32(42), &CanonicalType::Float64).unwrap(),
        Value::Float64(42.0)
    );
    assert_eq!(
        convert(&Value::Float64(2.0), &CanonicalType::Int16).unwrap(),
        Value::Int16(2)
    );
    assert!(convert(&Value::Float64(2.5), &CanonicalType::Int16).is_err());
    assert!(convert(&Value::Int64(i64::from(i16::MAX) + 1), &CanonicalType::Int16).is_err());
}

#[test]
fn default_values_render_in_every_bridge() {
    for ty in [
        CanonicalType::Boolean,
        CanonicalType::Int32,
        CanonicalType::Float64,
        CanonicalType::String,
        CanonicalType::array_of(CanonicalType::Int64),
        threads(),
    ] {
        let value = AttributeValue::default_for(&ty);
        assert!(JsonBridge.to_wire(&value).is_ok(), "json {}", ty);
        assert!(OpenTypeBridge.to_wire(&value).is_ok(), "open type {}", ty);
    }
}
