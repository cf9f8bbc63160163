//! Row and record types shared by both pipeline directions
//!
//! A [`Row`] is an ordered `field → value-or-null` map. A [`RowBatch`] groups
//! rows per destination table in first-seen table order. A [`Record`] is the
//! strongly typed tree materialized by the export pipeline before it is
//! serialized to XML.

use crate::domain::ids::TableName;
use indexmap::IndexMap;

/// Column-name prefix marking a field that maps to an XML attribute
pub const ATTRIBUTE_PREFIX: &str = "_attr_";

/// Attribute disambiguating a stored NULL from a stored empty string
pub const NULL_MARKER: &str = "null";

/// Returns the XML attribute name for an attribute field, if it is one
///
/// ```
/// use arbor::domain::row::attribute_name;
///
/// assert_eq!(attribute_name("_attr_id"), Some("id"));
/// assert_eq!(attribute_name("name"), None);
/// ```
pub fn attribute_name(field: &str) -> Option<&str> {
    field
        .strip_prefix(ATTRIBUTE_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Returns the column name backing an XML attribute
pub fn attribute_field(attribute: &str) -> String {
    format!("{ATTRIBUTE_PREFIX}{attribute}")
}

/// One relational row: ordered field names with nullable text values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: IndexMap<String, Option<String>>,
}

impl Row {
    /// Creates an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from `(field, value)` pairs, keeping their order
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Sets a field, keeping its original position if it already exists
    pub fn insert(&mut self, field: impl Into<String>, value: Option<String>) {
        self.fields.insert(field.into(), value);
    }

    /// Removes a field, preserving the order of the remaining ones
    pub fn remove(&mut self, field: &str) -> Option<Option<String>> {
        self.fields.shift_remove(field)
    }

    /// Raw lookup: `None` if the field is absent, `Some(None)` if it is NULL
    pub fn get(&self, field: &str) -> Option<&Option<String>> {
        self.fields.get(field)
    }

    /// Non-null value of a field
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }

    /// Mutable access to a field's value
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        self.fields.get_mut(field)
    }

    /// Whether the field is present (NULL counts as present)
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `(field, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Per-table row batches produced by one pipeline direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatch {
    tables: IndexMap<TableName, Vec<Row>>,
}

impl RowBatch {
    /// Creates an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table so it appears in the batch even with zero rows
    pub fn ensure_table(&mut self, table: &TableName) {
        if !self.tables.contains_key(table) {
            self.tables.insert(table.clone(), Vec::new());
        }
    }

    /// Appends a row to a table's batch
    pub fn push(&mut self, table: &TableName, row: Row) {
        match self.tables.get_mut(table) {
            Some(rows) => rows.push(row),
            None => {
                self.tables.insert(table.clone(), vec![row]);
            }
        }
    }

    /// Rows for a table (empty if the table never received rows)
    pub fn rows(&self, table: &TableName) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable rows for a table
    pub fn rows_mut(&mut self, table: &TableName) -> Option<&mut Vec<Row>> {
        self.tables.get_mut(table)
    }

    /// Tables in first-seen order with their rows
    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &[Row])> {
        self.tables.iter().map(|(t, rows)| (t, rows.as_slice()))
    }

    /// Mutable iteration over tables and their rows
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TableName, &mut Vec<Row>)> {
        self.tables.iter_mut()
    }

    /// Row count per table
    pub fn counts(&self) -> IndexMap<String, usize> {
        self.tables
            .iter()
            .map(|(t, rows)| (t.to_string(), rows.len()))
            .collect()
    }

    /// Total rows across all tables
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// One node of a materialized record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordNode {
    /// Element field; `None` is a stored NULL
    Leaf { name: String, value: Option<String> },

    /// Attribute field (NULL attributes are never materialized)
    Attribute { name: String, value: String },

    /// Nested child table rows behind an insertion path
    Children {
        table: TableName,
        tag: String,
        path: Vec<String>,
        emit_empty: bool,
        records: Vec<Record>,
    },
}

/// A row and its recursively expanded children, ready for serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Table the row came from
    pub table: TableName,

    /// Ordered attributes, leaves and child groups
    pub nodes: Vec<RecordNode>,
}

impl Record {
    /// Creates an empty record for a table
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            nodes: Vec::new(),
        }
    }

    /// Number of records in this subtree, this one included
    pub fn subtree_size(&self) -> usize {
        1 + self
            .nodes
            .iter()
            .map(|node| match node {
                RecordNode::Children { records, .. } => {
                    records.iter().map(Record::subtree_size).sum()
                }
                _ => 0,
            })
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_row_preserves_order_and_nulls() {
        let mut row = Row::new();
        row.insert("id", Some("1".to_string()));
        row.insert("name", None);
        row.insert("desc", Some(String::new()));

        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["id", "name", "desc"]);
        assert_eq!(row.get("name"), Some(&None));
        assert_eq!(row.value("name"), None);
        assert_eq!(row.value("desc"), Some(""));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_row_remove_keeps_order() {
        let mut row = Row::from_pairs([
            ("a", Some("1".to_string())),
            ("b", Some("2".to_string())),
            ("c", Some("3".to_string())),
        ]);
        row.remove("b");
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["a", "c"]);
    }

    #[test]
    fn test_row_batch_grouping() {
        let item = TableName::from_str("item").unwrap();
        let tag = TableName::from_str("item_tag").unwrap();
        let mut batch = RowBatch::new();
        batch.ensure_table(&item);
        batch.ensure_table(&tag);
        batch.push(&item, Row::from_pairs([("id", Some("1".to_string()))]));

        assert_eq!(batch.rows(&item).len(), 1);
        assert!(batch.rows(&tag).is_empty());
        assert_eq!(batch.total_rows(), 1);
        let order: Vec<String> = batch.iter().map(|(t, _)| t.to_string()).collect();
        assert_eq!(order, vec!["item", "item_tag"]);
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_name("_attr_name"), Some("name"));
        assert_eq!(attribute_name("_attr_"), None);
        assert_eq!(attribute_field("id"), "_attr_id");
    }

    #[test]
    fn test_record_subtree_size() {
        let item = TableName::from_str("item").unwrap();
        let tag = TableName::from_str("item_tag").unwrap();
        let mut record = Record::new(item);
        record.nodes.push(RecordNode::Children {
            table: tag.clone(),
            tag: "tag".to_string(),
            path: vec![],
            emit_empty: false,
            records: vec![Record::new(tag.clone()), Record::new(tag)],
        });
        assert_eq!(record.subtree_size(), 3);
    }
}
