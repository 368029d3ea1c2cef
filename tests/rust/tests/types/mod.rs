//! Type system integration tests
//!
//! Values crossing from one bridge to another through the canonical model.

mod cross_bridge;
