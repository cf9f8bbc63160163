//! In-memory relational store
//!
//! Understands the query shapes schema artifacts use against it:
//! `SELECT * FROM <table> [WHERE <column> = '<value>'] [ORDER BY <column> [ASC|DESC]]`.

use crate::adapters::database::traits::{
    EncodingStore, PageWindow, RelationalStore, StoreTransaction,
};
use crate::core::encoding::EncodingRecord;
use crate::domain::errors::StoreError;
use crate::domain::ids::TableName;
use crate::domain::row::Row;
use crate::domain::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryColumn {
    pub name: String,
    /// Maximum characters, `None` for unbounded text
    pub capacity: Option<usize>,
}

impl MemoryColumn {
    /// Unbounded text column
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
        }
    }

    /// Bounded `varchar(capacity)` column
    pub fn varchar(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: Some(capacity),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<MemoryColumn>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Option<&MemoryColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row reshaped to the table's full column list
    fn normalize(&self, table: &str, row: &Row) -> Result<Row> {
        for (field, value) in row.iter() {
            let column = self.column(field).ok_or_else(|| {
                StoreError::QueryFailed(format!(
                    "column \"{field}\" of relation \"{table}\" does not exist"
                ))
            })?;
            if let (Some(capacity), Some(value)) = (column.capacity, value) {
                let length = value.chars().count();
                if length > capacity {
                    return Err(StoreError::ColumnTooNarrow {
                        table: table.to_string(),
                        column: field.to_string(),
                        capacity,
                        length,
                    }
                    .into());
                }
            }
        }
        Ok(Row::from_pairs(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), row.value(&c.name).map(str::to_string))),
        ))
    }
}

type Tables = BTreeMap<String, MemoryTable>;

/// Pauses the next insert into a table until released
#[derive(Debug, Clone, Default)]
pub struct InsertGate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl InsertGate {
    /// Resolves once an insert is waiting at the gate
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Lets the waiting insert continue
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct MemoryInner {
    tables: Mutex<Tables>,
    encodings: Mutex<HashMap<(String, String), EncodingRecord>>,
    failing_inserts: Mutex<HashSet<String>>,
    held_inserts: Mutex<HashMap<String, InsertGate>>,
    query_log: Mutex<Vec<String>>,
}

/// Relational store kept entirely in process memory
///
/// Used by tests and as a dry-run target. Transactions work on a snapshot
/// of every table and publish it on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct SelectQuery {
    table: String,
    filter: Option<(String, String)>,
    order: Option<(String, bool)>,
}

fn select_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?is)^\s*SELECT\s+\*\s+FROM\s+([A-Za-z0-9_.]+)(?:\s+WHERE\s+([A-Za-z0-9_]+)\s*=\s*'([^']*)')?(?:\s+ORDER\s+BY\s+([A-Za-z0-9_]+)(?:\s+(ASC|DESC))?)?\s*;?\s*$",
            )
            .ok()
        })
        .as_ref()
}

fn parse_select(sql: &str) -> Result<SelectQuery> {
    let caps = select_pattern()
        .and_then(|re| re.captures(sql))
        .ok_or_else(|| StoreError::QueryFailed(format!("unsupported query: {sql}")))?;
    Ok(SelectQuery {
        table: caps[1].to_string(),
        filter: caps
            .get(2)
            .zip(caps.get(3))
            .map(|(c, v)| (c.as_str().to_string(), v.as_str().to_string())),
        order: caps.get(4).map(|c| {
            let descending = caps
                .get(5)
                .is_some_and(|d| d.as_str().eq_ignore_ascii_case("desc"));
            (c.as_str().to_string(), descending)
        }),
    })
}

/// Numeric when both sides parse, text otherwise; NULL sorts last
fn compare_values(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.cmp(b),
        },
    }
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table
    pub fn create_table(&self, table: &str, columns: Vec<MemoryColumn>) {
        self.inner.tables.lock().insert(
            table.to_string(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Creates a table of unbounded text columns
    pub fn create_text_table(&self, table: &str, columns: &[&str]) {
        self.create_table(table, columns.iter().map(|c| MemoryColumn::text(*c)).collect());
    }

    /// Appends rows outside of any transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown or a row doesn't fit its columns.
    pub fn seed_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        for row in rows {
            let row = target.normalize(table, &row)?;
            target.rows.push(row);
        }
        Ok(())
    }

    /// Committed rows of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Capacity of a column, if bounded
    pub fn capacity(&self, table: &str, column: &str) -> Option<usize> {
        self.inner
            .tables
            .lock()
            .get(table)
            .and_then(|t| t.column(column))
            .and_then(|c| c.capacity)
    }

    /// Makes every insert into `table` fail with a constraint violation
    pub fn fail_on_insert(&self, table: &str) {
        self.inner.failing_inserts.lock().insert(table.to_string());
    }

    /// Holds the next insert into `table` inside its transaction
    pub fn hold_next_insert(&self, table: &str) -> InsertGate {
        let gate = InsertGate::default();
        self.inner
            .held_inserts
            .lock()
            .insert(table.to_string(), gate.clone());
        gate
    }

    /// Every query executed so far
    pub fn query_log(&self) -> Vec<String> {
        self.inner.query_log.lock().clone()
    }

    fn select(&self, sql: &str) -> Result<Vec<Row>> {
        self.inner.query_log.lock().push(sql.to_string());
        let query = parse_select(sql)?;
        let tables = self.inner.tables.lock();
        let table = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::TableNotFound(query.table.clone()))?;

        let mut rows: Vec<Row> = match &query.filter {
            Some((column, value)) => table
                .rows
                .iter()
                .filter(|row| row.value(column) == Some(value.as_str()))
                .cloned()
                .collect(),
            None => table.rows.clone(),
        };
        if let Some((column, descending)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.value(column), b.value(column));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        Ok(rows)
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn count_rows(&self, sql: &str) -> Result<u64> {
        Ok(self.select(sql)?.len() as u64)
    }

    async fn fetch_rows(&self, sql: &str, window: Option<PageWindow>) -> Result<Vec<Row>> {
        let rows = self.select(sql)?;
        Ok(match window {
            Some(window) => rows
                .into_iter()
                .skip(window.offset as usize)
                .take(window.limit as usize)
                .collect(),
            None => rows,
        })
    }

    async fn column_ordinals(&self, table: &TableName) -> Result<Vec<(String, u32)>> {
        Ok(self
            .inner
            .tables
            .lock()
            .get(table.as_str())
            .map(|t| {
                t.columns
                    .iter()
                    .zip(1u32..)
                    .map(|(c, ordinal)| (c.name.clone(), ordinal))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn column_capacities(&self, table: &TableName) -> Result<HashMap<String, usize>> {
        Ok(self
            .inner
            .tables
            .lock()
            .get(table.as_str())
            .map(|t| {
                t.columns
                    .iter()
                    .filter_map(|c| c.capacity.map(|cap| (c.name.clone(), cap)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn widen_column(&self, table: &TableName, column: &str, capacity: usize) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        let target = tables
            .get_mut(table.as_str())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let column = target
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| StoreError::QueryFailed(format!("column \"{column}\" does not exist")))?;
        if column.capacity.is_some_and(|current| current < capacity) {
            column.capacity = Some(capacity);
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let snapshot = self.inner.tables.lock().clone();
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            tables: snapshot,
        }))
    }
}

/// Snapshot transaction over a [`MemoryStore`]
pub struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    tables: Tables,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let target = self
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let removed = target.rows.len() as u64;
        target.rows.clear();
        Ok(removed)
    }

    async fn insert_batch(&mut self, table: &TableName, rows: &[Row]) -> Result<u64> {
        if self.inner.failing_inserts.lock().contains(table.as_str()) {
            return Err(StoreError::ConstraintViolation {
                table: table.to_string(),
                message: "insert rejected".to_string(),
            }
            .into());
        }
        let held = self.inner.held_inserts.lock().remove(table.as_str());
        if let Some(gate) = held {
            gate.pass().await;
        }
        let target = self
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let normalized = rows
            .iter()
            .map(|row| target.normalize(table.as_str(), row))
            .collect::<Result<Vec<_>>>()?;
        target.rows.extend(normalized);
        Ok(rows.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        *self.inner.tables.lock() = self.tables;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl EncodingStore for MemoryStore {
    async fn load(&self, table: &TableName, variant: &str) -> Result<Option<EncodingRecord>> {
        Ok(self
            .inner
            .encodings
            .lock()
            .get(&(table.as_str().to_string(), variant.to_string()))
            .cloned())
    }

    async fn save(&self, record: &EncodingRecord) -> Result<()> {
        self.inner.encodings.lock().insert(
            (record.table.as_str().to_string(), record.variant.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(pairs.iter().map(|(k, v)| (*k, Some(v.to_string()))))
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table(
            "item",
            vec![
                MemoryColumn::text("id"),
                MemoryColumn::varchar("name", 8),
                MemoryColumn::text("price"),
            ],
        );
        store
            .seed_rows(
                "item",
                vec![
                    row(&[("id", "10"), ("name", "sword")]),
                    row(&[("id", "2"), ("name", "shield"), ("price", "5")]),
                    row(&[("id", "7"), ("name", "bow")]),
                ],
            )
            .unwrap();
        store
    }

    fn item() -> TableName {
        TableName::new("item").unwrap()
    }

    #[tokio::test]
    async fn test_select_order_and_window() {
        let store = store();
        let sql = "SELECT * FROM item ORDER BY id";
        assert_eq!(store.count_rows(sql).await.unwrap(), 3);

        let page = store
            .fetch_rows(sql, Some(PageWindow::page(1, 2)))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].value("id"), Some("10"));

        let all = store.fetch_rows(sql, None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.value("id").unwrap()).collect();
        assert_eq!(ids, vec!["2", "7", "10"]);
        // missing values come back as NULL in column order
        assert_eq!(all[1].columns().collect::<Vec<_>>(), vec!["id", "name", "price"]);
        assert_eq!(all[1].get("price"), Some(&None));
    }

    #[tokio::test]
    async fn test_where_filter() {
        let store = store();
        let rows = store
            .fetch_rows("select * from item where name = 'bow'", None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store.fetch_rows("SELECT id FROM item", None).await.is_err());
        assert!(store.fetch_rows("SELECT * FROM nope", None).await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.delete_all(&item()).await.unwrap(), 3);
        tx.insert_batch(&item(), &[row(&[("id", "1")])]).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.rows("item").len(), 3);

        let mut tx = store.begin().await.unwrap();
        tx.delete_all(&item()).await.unwrap();
        tx.insert_batch(&item(), &[row(&[("id", "1")])]).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.rows("item").len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_and_widen() {
        let store = store();
        let long = row(&[("id", "1"), ("name", "longsword+1")]);
        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_batch(&item(), &[long.clone()]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::domain::ArborError::Store(StoreError::ColumnTooNarrow {
                capacity: 8,
                length: 11,
                ..
            })
        ));
        drop(tx);

        store.widen_column(&item(), "name", 11).await.unwrap();
        assert_eq!(store.capacity("item", "name"), Some(11));
        let mut tx = store.begin().await.unwrap();
        tx.insert_batch(&item(), &[long]).await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata() {
        let store = store();
        let ordinals = store.column_ordinals(&item()).await.unwrap();
        assert_eq!(ordinals[0], ("id".to_string(), 1));
        assert_eq!(ordinals[2], ("price".to_string(), 3));
        let capacities = store.column_capacities(&item()).await.unwrap();
        assert_eq!(capacities.get("name"), Some(&8));
        assert!(!capacities.contains_key("id"));
        let unknown = TableName::new("ghost").unwrap();
        assert!(store.column_ordinals(&unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let store = store();
        store.fail_on_insert("item");
        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_batch(&item(), &[row(&[("id", "1")])]).await.unwrap_err();
        assert_eq!(err.kind(), "store");
    }

    #[tokio::test]
    async fn test_held_insert_waits_for_release() {
        let store = store();
        let gate = store.hold_next_insert("item");

        let mut tx = store.begin().await.unwrap();
        let insert = async move {
            tx.insert_batch(&item(), &[row(&[("id", "1")])]).await.unwrap();
            tx.commit().await.unwrap();
        };
        let release = async {
            gate.reached().await;
            assert_eq!(store.rows("item").len(), 3);
            gate.release();
        };
        tokio::join!(insert, release);
        assert_eq!(store.rows("item").len(), 4);

        // only the next insert is held
        let mut tx = store.begin().await.unwrap();
        tx.insert_batch(&item(), &[row(&[("id", "2")])]).await.unwrap();
    }
}
