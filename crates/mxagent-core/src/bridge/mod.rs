//! Type Bridges
//!
//! A bridge maps canonical values to and from one protocol's wire
//! representation. Bridges are stateless and round-trip exactly unless
//! [`TypeBridge::precision_loss`] declares otherwise for a type.
//!
//! - **JsonBridge**: `serde_json::Value`, used by the REST and command gateways
//! - **OpenTypeBridge**: JMX OpenType-style simple/composite/tabular values

pub mod json;
pub mod open_type;

pub use json::JsonBridge;
pub use open_type::{
    composite_type_of, open_type_of, tabular_type_of, CompositeData, CompositeItem, CompositeType,
    OpenArray, OpenType, OpenTypeBridge, OpenValue, SimpleType, TabularData, TabularType,
};

use crate::error::TypeError;
use crate::types::{AttributeValue, CanonicalType};

/// Bidirectional converter between canonical values and a wire format.
pub trait TypeBridge: Send + Sync {
    /// The bridge's wire representation
    type Wire;

    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Render a canonical value. Maps and tables become keyed records,
    /// arrays are bridged element by element.
    fn to_wire(&self, value: &AttributeValue) -> Result<Self::Wire, TypeError>;

    /// Parse a wire value as the declared canonical type, validating
    /// composite column sets against the schema.
    fn from_wire(&self, wire: &Self::Wire, ty: &CanonicalType)
        -> Result<AttributeValue, TypeError>;

    /// Documented precision limitation for values of `ty`, if any.
    fn precision_loss(&self, _ty: &CanonicalType) -> Option<&'static str> {
        None
    }
}
