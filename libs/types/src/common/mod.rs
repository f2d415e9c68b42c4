//! Common types shared by every layer: typed identifiers and registry errors.

pub mod errors;
pub mod identifiers;
