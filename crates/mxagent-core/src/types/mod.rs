//! Canonical Type System
//!
//! - **CanonicalType**: fixed set of semantic kinds (scalars, array, map, table)
//! - **Value / AttributeValue**: runtime values, optionally paired with their type
//! - **Projections**: exact conversions between canonical types

mod canonical;
mod projection;
mod value;

pub use canonical::{CanonicalType, Column, MapType, TableType};
pub use projection::{classify, convert, projection_exists};
pub use value::{AttributeValue, MapValue, Value};

// Numeric types used by the Decimal and BigInteger variants
pub use bigdecimal::num_bigint::BigInt;
pub use bigdecimal::BigDecimal;
