//! Relational store abstraction traits
//!
//! This module defines the traits that store adapters must implement
//! to work with Arbor.

use crate::core::encoding::EncodingRecord;
use crate::domain::ids::TableName;
use crate::domain::row::Row;
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A slice of a query's result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Rows to skip
    pub offset: u64,

    /// Maximum rows to return
    pub limit: u64,
}

impl PageWindow {
    /// Window for the zero-based page `index` of `size` rows
    pub fn page(index: u64, size: u64) -> Self {
        Self {
            offset: index * size,
            limit: size,
        }
    }
}

/// Relational store used by both pipelines
///
/// Row values travel as text; `None` is SQL NULL.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Test the store connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Count the rows a query returns
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn count_rows(&self, sql: &str) -> Result<u64>;

    /// Fetch the rows of a query, optionally restricted to a window
    ///
    /// Column order in each row follows the result set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn fetch_rows(&self, sql: &str, window: Option<PageWindow>) -> Result<Vec<Row>>;

    /// Column names with their 1-based ordinal positions
    ///
    /// An unknown table yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata query fails.
    async fn column_ordinals(&self, table: &TableName) -> Result<Vec<(String, u32)>>;

    /// Maximum character length of bounded text columns
    ///
    /// Unbounded columns are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata query fails.
    async fn column_capacities(&self, table: &TableName) -> Result<HashMap<String, usize>>;

    /// Widen a bounded text column to hold at least `capacity` characters
    ///
    /// # Errors
    ///
    /// Returns an error if the column cannot be altered.
    async fn widen_column(&self, table: &TableName, column: &str, capacity: usize) -> Result<()>;

    /// Open a transaction
    ///
    /// # Errors
    ///
    /// Returns an error if no connection is available or BEGIN fails.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// One open transaction
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// or [`rollback`](StoreTransaction::rollback) discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Delete every row of a table, returning the number removed
    async fn delete_all(&mut self, table: &TableName) -> Result<u64>;

    /// Insert rows into a table, returning the number inserted
    ///
    /// Rows may carry different column sets.
    async fn insert_batch(&mut self, table: &TableName, rows: &[Row]) -> Result<u64>;

    /// Make the writes durable
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the writes
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage for per-(table, variant) encoding metadata
#[async_trait]
pub trait EncodingStore: Send + Sync {
    /// Load the record for a table and variant key
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when nothing was recorded yet.
    async fn load(&self, table: &TableName, variant: &str) -> Result<Option<EncodingRecord>>;

    /// Insert or replace a record
    async fn save(&self, record: &EncodingRecord) -> Result<()>;
}
