//! Core data types: symbols, subscription kinds, and quote structs.

pub mod quote;
pub mod symbol;

pub use quote::*;
pub use symbol::*;
