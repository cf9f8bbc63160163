//! Store abstraction layer
//!
//! This module provides a trait-based abstraction over the relational store,
//! allowing Arbor to run against PostgreSQL or an in-memory store.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, Stores};
pub use traits::{EncodingStore, PageWindow, RelationalStore, StoreTransaction};
