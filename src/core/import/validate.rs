//! Pre-transaction validation of walked rows
//!
//! Column metadata is fetched once per table; the checks themselves run per
//! table on the rayon pool and append to a shared issue list.

use crate::adapters::database::RelationalStore;
use crate::core::compliance::ComplianceFilter;
use crate::domain::errors::ValidationIssue;
use crate::domain::ids::TableName;
use crate::domain::row::{Row, RowBatch};
use crate::domain::Result;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Known columns and bounded capacities of one table
#[derive(Debug, Clone, Default)]
pub struct ColumnMetadata {
    columns: HashSet<String>,
    capacities: HashMap<String, usize>,
}

impl ColumnMetadata {
    pub fn new(
        columns: impl IntoIterator<Item = String>,
        capacities: HashMap<String, usize>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(|c| c.to_lowercase()).collect(),
            capacities: capacities
                .into_iter()
                .map(|(c, cap)| (c.to_lowercase(), cap))
                .collect(),
        }
    }

    /// Unknown tables report no columns; nothing is checked against them
    pub fn knows_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column.to_lowercase())
    }

    pub fn capacity(&self, column: &str) -> Option<usize> {
        self.capacities.get(&column.to_lowercase()).copied()
    }
}

/// A bounded column that must grow before the insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widening {
    pub table: TableName,
    pub column: String,
    pub capacity: usize,
    pub required: usize,
}

/// Issues and planned widenings for a batch
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub issues: Vec<ValidationIssue>,
    pub widenings: Vec<Widening>,
}

impl ValidationOutcome {
    pub fn blocking(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }
}

/// Loads column metadata for every table of a batch
///
/// # Errors
///
/// Returns a store error if a metadata query fails.
pub async fn load_metadata(
    store: &dyn RelationalStore,
    batch: &RowBatch,
) -> Result<HashMap<TableName, ColumnMetadata>> {
    let lookups = batch.iter().map(|(table, _)| async move {
        let ordinals = store.column_ordinals(table).await?;
        let capacities = store.column_capacities(table).await?;
        let metadata = ColumnMetadata::new(ordinals.into_iter().map(|(name, _)| name), capacities);
        Ok::<_, crate::domain::errors::ArborError>((table.clone(), metadata))
    });
    Ok(futures::future::try_join_all(lookups).await?.into_iter().collect())
}

/// Validates every table of a batch
///
/// Value-rule findings are warnings. Unknown columns are errors. Values wider
/// than a bounded column become widenings when `auto_widen` is set, errors
/// otherwise.
pub fn validate_batch(
    batch: &RowBatch,
    metadata: &HashMap<TableName, ColumnMetadata>,
    filter: &ComplianceFilter,
    auto_widen: bool,
) -> ValidationOutcome {
    let issues = Mutex::new(Vec::new());
    let widenings = Mutex::new(Vec::new());
    let empty = ColumnMetadata::default();

    let tables: Vec<(&TableName, &[Row])> = batch.iter().collect();
    tables.par_iter().for_each(|(table, rows)| {
        let columns = metadata.get(*table).unwrap_or(&empty);
        let mut found = filter.check_batch(table.as_str(), rows);
        let widened = check_columns(table, rows, columns, auto_widen, &mut found);

        issues.lock().extend(found);
        widenings.lock().extend(widened);
    });

    // parallel completion order isn't stable
    let order: HashMap<&TableName, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, (t, _))| (*t, i))
        .collect();
    let mut issues = issues.into_inner();
    issues.sort_by_key(|issue| {
        let position = TableName::new(issue.table.as_str())
            .ok()
            .and_then(|t| order.get(&t).copied())
            .unwrap_or(usize::MAX);
        (position, issue.row.unwrap_or(0), issue.field.clone())
    });
    let mut widenings = widenings.into_inner();
    widenings.sort_by(|a, b| (a.table.as_str(), &a.column).cmp(&(b.table.as_str(), &b.column)));

    ValidationOutcome { issues, widenings }
}

fn check_columns(
    table: &TableName,
    rows: &[Row],
    metadata: &ColumnMetadata,
    auto_widen: bool,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Widening> {
    let mut unknown = HashSet::new();
    let mut required: HashMap<&str, usize> = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        for (field, value) in row.iter() {
            if metadata.knows_columns() && !metadata.has_column(field) {
                if unknown.insert(field) {
                    issues.push(
                        ValidationIssue::error(table.as_str(), "Column does not exist")
                            .with_field(field)
                            .with_row(index),
                    );
                }
                continue;
            }

            let (Some(value), Some(capacity)) = (value, metadata.capacity(field)) else {
                continue;
            };
            let length = value.chars().count();
            if length <= capacity {
                continue;
            }
            if auto_widen {
                let entry = required.entry(field).or_default();
                *entry = (*entry).max(length);
            } else {
                issues.push(
                    ValidationIssue::error(
                        table.as_str(),
                        format!("Value of {length} characters exceeds column capacity {capacity}"),
                    )
                    .with_field(field)
                    .with_row(index),
                );
            }
        }
    }

    required
        .into_iter()
        .filter_map(|(column, length)| {
            Some(Widening {
                table: table.clone(),
                column: column.to_string(),
                capacity: metadata.capacity(column)?,
                required: length,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryColumn, MemoryStore};
    use crate::core::registry::{ComplianceRules, FieldRegistry};
    use std::sync::Arc;

    fn table(name: &str) -> TableName {
        TableName::new(name).unwrap()
    }

    fn filter(rules: ComplianceRules) -> ComplianceFilter {
        let registry = FieldRegistry::new(Arc::new(MemoryStore::new()), rules);
        ComplianceFilter::new(Arc::new(registry), true)
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(pairs.iter().map(|(k, v)| (*k, Some(v.to_string()))))
    }

    fn batch() -> RowBatch {
        let mut batch = RowBatch::new();
        batch.push(&table("item"), row(&[("id", "1"), ("name", "Longsword")]));
        batch.push(&table("item"), row(&[("id", "2"), ("name", "Axe")]));
        batch
    }

    fn metadata(capacity: usize) -> HashMap<TableName, ColumnMetadata> {
        let mut caps = HashMap::new();
        caps.insert("name".to_string(), capacity);
        let mut map = HashMap::new();
        map.insert(
            table("item"),
            ColumnMetadata::new(["id".to_string(), "name".to_string()], caps),
        );
        map
    }

    #[test]
    fn test_clean_batch_has_no_issues() {
        let outcome =
            validate_batch(&batch(), &metadata(32), &filter(ComplianceRules::new()), false);
        assert!(outcome.issues.is_empty());
        assert!(outcome.widenings.is_empty());
    }

    #[test]
    fn test_too_long_value_blocks_without_auto_widen() {
        let outcome =
            validate_batch(&batch(), &metadata(5), &filter(ComplianceRules::new()), false);
        assert!(outcome.has_blocking());
        let issue = outcome.blocking().next().unwrap();
        assert_eq!(issue.field.as_deref(), Some("name"));
        assert_eq!(issue.row, Some(0));
    }

    #[test]
    fn test_auto_widen_plans_the_widest_value() {
        let outcome = validate_batch(&batch(), &metadata(5), &filter(ComplianceRules::new()), true);
        assert!(!outcome.has_blocking());
        assert_eq!(
            outcome.widenings,
            vec![Widening {
                table: table("item"),
                column: "name".to_string(),
                capacity: 5,
                required: 9,
            }]
        );
    }

    #[test]
    fn test_unknown_column_reported_once() {
        let mut batch = batch();
        batch.push(&table("item"), row(&[("id", "3"), ("colour", "red")]));
        batch.push(&table("item"), row(&[("id", "4"), ("colour", "blue")]));
        let outcome = validate_batch(&batch, &metadata(32), &filter(ComplianceRules::new()), false);
        assert_eq!(outcome.blocking().count(), 1);
    }

    #[test]
    fn test_value_rules_only_warn() {
        let rules = ComplianceRules::from_toml(
            "[[validation]]\ntable = \"item\"\nfield = \"id\"\nmax = 1.0\n",
        )
        .unwrap();
        let outcome = validate_batch(&batch(), &metadata(32), &filter(rules), false);
        assert_eq!(outcome.issues.len(), 1);
        assert!(!outcome.has_blocking());
        assert_eq!(outcome.issues[0].row, Some(1));
    }

    #[tokio::test]
    async fn test_load_metadata_from_store() {
        let store = MemoryStore::new();
        store.create_table(
            "item",
            vec![MemoryColumn::text("id"), MemoryColumn::varchar("name", 8)],
        );
        let metadata = load_metadata(&store, &batch()).await.unwrap();
        let item = &metadata[&table("item")];
        assert!(item.has_column("ID"));
        assert_eq!(item.capacity("name"), Some(8));
        assert_eq!(item.capacity("id"), None);
    }
}
