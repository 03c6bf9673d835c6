//! Time-series aspect index: shared domain types.
//!
//! This crate defines index naming, document identity, the stored document
//! layout, range query construction, result decoding and the traits every
//! index backend implements. It contains no infrastructure code.

pub mod backend;
pub mod document;
pub mod envelope;
pub mod error;
pub mod event;
pub mod index;
pub mod projection;
pub mod query;
