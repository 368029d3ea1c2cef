//! Attribute Registry
//!
//! Composite identifier -> (descriptor, live accessor). See
//! [`AttributeRegistry`] for the locking discipline.

mod descriptor;
mod registry;

pub use descriptor::AttributeDescriptor;
pub use registry::AttributeRegistry;
