//! HTTP handlers for schema-model endpoints.

pub mod entity;
pub use entity::*;
