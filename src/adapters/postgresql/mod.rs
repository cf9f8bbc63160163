//! PostgreSQL integration
//!
//! Implements [`RelationalStore`](crate::adapters::database::RelationalStore)
//! and [`EncodingStore`](crate::adapters::database::EncodingStore) on a
//! deadpool-managed connection pool.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::{PostgreSQLAdapter, PostgreSQLTransaction};
pub use client::PostgreSQLClient;
pub use models::PostgreSQLEncodingMetadata;
