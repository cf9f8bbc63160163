//! PostgreSQL adapter implementing the store traits
//!
//! Values are read over the simple query protocol so every column arrives as
//! text regardless of its SQL type. Inserts send quoted literals and let the
//! server coerce them to the column types.

use crate::adapters::database::traits::{
    EncodingStore, PageWindow, RelationalStore, StoreTransaction,
};
use crate::adapters::postgresql::client::{
    driver_message, quote_ident, quote_literal, write_error, PostgreSQLClient,
};
use crate::adapters::postgresql::models::PostgreSQLEncodingMetadata;
use crate::core::encoding::EncodingRecord;
use crate::domain::errors::StoreError;
use crate::domain::ids::TableName;
use crate::domain::row::Row;
use crate::domain::Result;
use async_trait::async_trait;
use deadpool_postgres::Object;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Strips a trailing semicolon so a query can be nested as a subquery
fn subquery(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// (schema, table) for an information_schema lookup
fn split_table(table: &TableName) -> (Option<&str>, &str) {
    match table.as_str().split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table.as_str()),
    }
}

/// Multi-row INSERT statements, one per run of rows sharing a column set
fn insert_statements(table: &TableName, rows: &[Row]) -> Vec<String> {
    let mut statements = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let columns: Vec<&str> = rows[start].columns().collect();
        if columns.is_empty() {
            statements.push(format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table.as_str())));
            start += 1;
            continue;
        }
        let mut end = start + 1;
        while end < rows.len() && rows[end].columns().eq(columns.iter().copied()) {
            end += 1;
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ",
            quote_ident(table.as_str()),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
        );
        for (i, row) in rows[start..end].iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let values: Vec<String> = row.iter().map(|(_, v)| quote_literal(v)).collect();
            let _ = write!(sql, "({})", values.join(", "));
        }
        statements.push(sql);
        start = end;
    }
    statements
}

/// PostgreSQL implementation of the store traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

#[async_trait]
impl RelationalStore for PostgreSQLAdapter {
    fn backend_name(&self) -> &'static str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn count_rows(&self, sql: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) AS total FROM ({}) AS counted", subquery(sql));
        let rows = self.client.query_text(&query).await?;
        rows.first()
            .and_then(|row| row.value("total"))
            .and_then(|total| total.parse().ok())
            .ok_or_else(|| {
                StoreError::QueryFailed(format!("COUNT returned no value for: {sql}")).into()
            })
    }

    async fn fetch_rows(&self, sql: &str, window: Option<PageWindow>) -> Result<Vec<Row>> {
        let query = match window {
            Some(w) => format!(
                "SELECT * FROM ({}) AS page LIMIT {} OFFSET {}",
                subquery(sql),
                w.limit,
                w.offset
            ),
            None => subquery(sql).to_string(),
        };
        tracing::trace!(query = %query, "Fetching rows");
        self.client.query_text(&query).await
    }

    async fn column_ordinals(&self, table: &TableName) -> Result<Vec<(String, u32)>> {
        let (schema, name) = split_table(table);
        let rows = self
            .client
            .query(
                "SELECT column_name::text, ordinal_position::int4 \
                 FROM information_schema.columns \
                 WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let ordinal: i32 = row.get(1);
                (row.get::<_, String>(0), ordinal.max(0) as u32)
            })
            .collect())
    }

    async fn column_capacities(&self, table: &TableName) -> Result<HashMap<String, usize>> {
        let (schema, name) = split_table(table);
        let rows = self
            .client
            .query(
                "SELECT column_name::text, character_maximum_length::int4 \
                 FROM information_schema.columns \
                 WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2 \
                   AND character_maximum_length IS NOT NULL",
                &[&schema, &name],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let capacity: Option<i32> = row.get(1);
                capacity.map(|c| (row.get::<_, String>(0), c.max(0) as usize))
            })
            .collect())
    }

    async fn widen_column(&self, table: &TableName, column: &str, capacity: usize) -> Result<()> {
        let statement = format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE varchar({capacity})",
            quote_ident(table.as_str()),
            quote_ident(column)
        );
        self.client
            .execute(&statement, &[])
            .await
            .map_err(|e| {
                StoreError::QueryFailed(format!("Failed to widen {table}.{column}: {e}"))
            })?;

        tracing::info!(table = %table, column = column, capacity = capacity, "Column widened");
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let conn = self.client.get_connection().await?;
        conn.batch_execute("BEGIN")
            .await
            .map_err(|e| {
                StoreError::TransactionFailed(format!("BEGIN failed: {}", driver_message(&e)))
            })?;
        let tx = PostgreSQLTransaction { conn: Some(conn) };
        tx.connection()?
            .batch_execute(&self.client.statement_timeout_sql(true))
            .await
            .map_err(|e| StoreError::TransactionFailed(driver_message(&e)))?;
        Ok(Box::new(tx))
    }
}

/// Transaction pinned to one pooled connection
///
/// A transaction dropped while still open detaches its connection from the
/// pool, so the server aborts it when the connection closes.
pub struct PostgreSQLTransaction {
    conn: Option<Object>,
}

impl PostgreSQLTransaction {
    fn connection(&self) -> Result<&Object> {
        self.conn
            .as_ref()
            .ok_or_else(|| {
                StoreError::TransactionFailed("transaction already finished".to_string()).into()
            })
    }

    async fn finish(&mut self, command: &str) -> Result<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| {
                StoreError::TransactionFailed("transaction already finished".to_string())
            })?;
        match conn.batch_execute(command).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // connection state is unknown; keep it out of the pool
                drop(Object::take(conn));
                Err(StoreError::TransactionFailed(format!(
                    "{command} failed: {}",
                    driver_message(&e)
                ))
                .into())
            }
        }
    }
}

impl Drop for PostgreSQLTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Open transaction dropped; closing its connection");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl StoreTransaction for PostgreSQLTransaction {
    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let statement = format!("DELETE FROM {}", quote_ident(table.as_str()));
        self.connection()?
            .execute(statement.as_str(), &[])
            .await
            .map_err(|e| write_error(table.as_str(), &e).into())
    }

    async fn insert_batch(&mut self, table: &TableName, rows: &[Row]) -> Result<u64> {
        let mut inserted = 0;
        for statement in insert_statements(table, rows) {
            inserted += self
                .connection()?
                .execute(statement.as_str(), &[])
                .await
                .map_err(|e| write_error(table.as_str(), &e))?;
        }
        Ok(inserted)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

#[async_trait]
impl EncodingStore for PostgreSQLAdapter {
    async fn load(&self, table: &TableName, variant: &str) -> Result<Option<EncodingRecord>> {
        let rows = self
            .client
            .query(
                "SELECT table_name, variant, charset, byte_order, has_bom, confidence, updated_at \
                 FROM arbor_encoding_metadata WHERE table_name = $1 AND variant = $2",
                &[&table.as_str(), &variant],
            )
            .await?;

        match rows.first() {
            Some(row) => {
                let metadata = PostgreSQLEncodingMetadata {
                    table_name: row.get("table_name"),
                    variant: row.get("variant"),
                    charset: row.get("charset"),
                    byte_order: row.get("byte_order"),
                    has_bom: row.get("has_bom"),
                    confidence: row.get("confidence"),
                    updated_at: row.get("updated_at"),
                };
                Ok(Some(metadata.to_domain()?))
            }
            None => {
                tracing::debug!(table = %table, variant = variant, "No encoding metadata stored");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &EncodingRecord) -> Result<()> {
        let metadata = PostgreSQLEncodingMetadata::from_domain(record);
        self.client
            .execute(
                "INSERT INTO arbor_encoding_metadata \
                 (table_name, variant, charset, byte_order, has_bom, confidence, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (table_name, variant) DO UPDATE SET \
                 charset = EXCLUDED.charset, byte_order = EXCLUDED.byte_order, \
                 has_bom = EXCLUDED.has_bom, confidence = EXCLUDED.confidence, \
                 updated_at = EXCLUDED.updated_at",
                &[
                    &metadata.table_name,
                    &metadata.variant,
                    &metadata.charset,
                    &metadata.byte_order,
                    &metadata.has_bom,
                    &metadata.confidence,
                    &metadata.updated_at,
                ],
            )
            .await?;
        Ok(())
    }
}
