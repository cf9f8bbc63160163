//! Record materialization and rendering
//!
//! Rows become [`Record`] trees first: fields in registry order, attributes
//! split from leaves, child tables attached through their association keys.
//! Rendering then turns records into [`XmlElement`]s under the configured
//! null and repeated-tag policies.

use crate::adapters::database::traits::RelationalStore;
use crate::config::{ArborConfig, NullPolicy, RepeatedTagPolicy};
use crate::core::compliance::{ComplianceFilter, FilterTotals};
use crate::core::registry::FieldRegistry;
use crate::domain::document::XmlElement;
use crate::domain::errors::ArborError;
use crate::domain::ids::{TableName, Variant};
use crate::domain::row::{attribute_name, Record, RecordNode, Row, NULL_MARKER};
use crate::domain::Result;
use crate::schema::{FieldMapping, SchemaNode};
use indexmap::IndexMap;
use std::collections::HashMap;

/// How records are written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub null_policy: NullPolicy,

    /// Joined multi-values are split on this separator into repeated elements
    pub split_separator: Option<String>,
}

impl RenderOptions {
    pub fn from_config(config: &ArborConfig) -> Self {
        let split_separator = (config.import.repeated_tag_policy == RepeatedTagPolicy::Join)
            .then(|| config.import.join_separator.clone())
            .filter(|s| !s.is_empty());
        Self {
            null_policy: config.export.null_policy,
            split_separator,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            null_policy: NullPolicy::Marker,
            split_separator: None,
        }
    }
}

/// A filtered row plus the unfiltered association keys its children need
///
/// Keys are captured before the compliance filter runs, so a blacklisted
/// key column still links rows even though it isn't written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub row: Row,
    keys: HashMap<String, String>,
}

impl SourceRow {
    /// Captures association keys of `node`'s mappings, then filters the row
    pub fn filtered(
        node: &SchemaNode,
        raw: Row,
        filter: &ComplianceFilter,
        totals: &mut FilterTotals,
    ) -> Self {
        let keys = node
            .mappings()
            .iter()
            .filter_map(|m| {
                let key = &m.association.parent_key;
                raw.value(key).map(|v| (key.clone(), v.to_string()))
            })
            .collect();

        let result = filter.filter_row(node.store_table().as_str(), raw);
        totals.removed += result.removed.len();
        totals.corrected += result.corrected.len();
        Self {
            row: result.row,
            keys,
        }
    }

    /// Non-null value of an association key column
    pub fn key(&self, column: &str) -> Option<&str> {
        self.keys.get(column).map(String::as_str)
    }
}

/// Every child table read once, grouped by association key
///
/// Built before any page runs and shared read-only between page tasks.
#[derive(Debug, Default)]
pub struct Prefetch {
    groups: HashMap<TableName, HashMap<String, Vec<SourceRow>>>,
    pub totals: FilterTotals,
}

impl Prefetch {
    /// Loads every descendant table of `root`
    ///
    /// Child rows whose key column is NULL can't belong to any parent and are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the first query or variant-substitution error.
    pub async fn load(
        store: &dyn RelationalStore,
        root: &SchemaNode,
        variant: Option<&Variant>,
        filter: &ComplianceFilter,
    ) -> Result<Self> {
        let mappings: Vec<&FieldMapping> = root
            .walk()
            .into_iter()
            .flat_map(|node| node.mappings())
            .collect();

        let queries = mappings
            .iter()
            .map(|m| m.child.query_for(variant))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let fetched =
            futures::future::try_join_all(queries.iter().map(|sql| store.fetch_rows(sql, None)))
                .await?;

        let mut prefetch = Self::default();
        for (mapping, rows) in mappings.into_iter().zip(fetched) {
            let child_key = &mapping.association.child_key;
            let total = rows.len();
            let mut groups: HashMap<String, Vec<SourceRow>> = HashMap::new();
            let mut orphans = 0usize;

            for raw in rows {
                let Some(key) = raw.value(child_key).map(str::to_string) else {
                    orphans += 1;
                    continue;
                };
                let source = SourceRow::filtered(&mapping.child, raw, filter, &mut prefetch.totals);
                groups.entry(key).or_default().push(source);
            }

            tracing::debug!(
                table = %mapping.child.table,
                rows = total,
                groups = groups.len(),
                orphans = orphans,
                "Child table prefetched"
            );
            prefetch.groups.insert(mapping.child.table.clone(), groups);
        }
        Ok(prefetch)
    }

    /// Child rows of `table` linked to `key`, in query order
    pub fn children(&self, table: &TableName, key: &str) -> &[SourceRow] {
        self.groups
            .get(table)
            .and_then(|groups| groups.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Builds [`Record`] trees from source rows
pub struct RecordBuilder<'a> {
    registry: &'a FieldRegistry,
    prefetch: &'a Prefetch,
    variant: Option<&'a Variant>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        registry: &'a FieldRegistry,
        prefetch: &'a Prefetch,
        variant: Option<&'a Variant>,
    ) -> Self {
        Self {
            registry,
            prefetch,
            variant,
        }
    }

    /// Materializes a root row and its descendants
    ///
    /// # Errors
    ///
    /// Returns an export error when a parent row has no value for an
    /// association key and the job has no variant to fall back on.
    pub fn build(&self, node: &SchemaNode, source: &SourceRow) -> Result<Record> {
        self.build_node(node, source, None)
    }

    fn build_node(
        &self,
        node: &SchemaNode,
        source: &SourceRow,
        reconstructed_key: Option<&str>,
    ) -> Result<Record> {
        let mut record = Record::new(node.table.clone());

        let columns = source
            .row
            .columns()
            .filter(|c| Some(*c) != reconstructed_key);
        for field in self.registry.ordered_fields(node.store_table().as_str(), columns) {
            let value = source.row.get(&field).cloned().flatten();
            match attribute_name(&field).map(str::to_string) {
                // NULL attributes are not written
                Some(name) => {
                    if let Some(value) = value {
                        record.nodes.push(RecordNode::Attribute { name, value });
                    }
                }
                None => record.nodes.push(RecordNode::Leaf { name: field, value }),
            }
        }

        for mapping in node.mappings() {
            let key = self.association_value(node, mapping, source)?;
            let records = self
                .prefetch
                .children(&mapping.child.table, key)
                .iter()
                .map(|child| {
                    self.build_node(
                        &mapping.child,
                        child,
                        Some(mapping.association.child_key.as_str()),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            record.nodes.push(RecordNode::Children {
                table: mapping.child.table.clone(),
                tag: mapping.tag.clone(),
                path: mapping.path.clone(),
                emit_empty: mapping.emit_empty,
                records,
            });
        }

        Ok(record)
    }

    fn association_value<'s>(
        &'s self,
        node: &SchemaNode,
        mapping: &FieldMapping,
        source: &'s SourceRow,
    ) -> Result<&'s str> {
        source
            .key(&mapping.association.parent_key)
            .or_else(|| self.variant.map(Variant::as_str))
            .ok_or_else(|| {
                ArborError::Export(format!(
                    "Association key '{}' of '{}' is NULL in a '{}' row and no variant is set",
                    mapping.association.parent_key, mapping.child.table, node.table
                ))
            })
    }
}

/// Renders a record as an element named `tag`
pub fn render_record(tag: &str, record: &Record, options: &RenderOptions) -> XmlElement {
    let mut element = XmlElement::new(tag);
    fill_element(&mut element, record, options);
    element
}

/// Writes a record's attributes, leaves and children into an element
pub fn fill_element(element: &mut XmlElement, record: &Record, options: &RenderOptions) {
    for node in &record.nodes {
        match node {
            RecordNode::Attribute { name, value } => {
                element.attributes.push((name.clone(), value.clone()));
            }
            RecordNode::Leaf { name, value: None } => {
                if options.null_policy == NullPolicy::Marker {
                    element
                        .children
                        .push(XmlElement::new(name.as_str()).with_attribute(NULL_MARKER, "true"));
                }
            }
            RecordNode::Leaf {
                name,
                value: Some(value),
            } => match options
                .split_separator
                .as_deref()
                .filter(|sep| value.contains(sep))
            {
                Some(sep) => {
                    for part in value.split(sep) {
                        element
                            .children
                            .push(XmlElement::new(name.as_str()).with_text(part));
                    }
                }
                None => element
                    .children
                    .push(XmlElement::new(name.as_str()).with_text(value.as_str())),
            },
            RecordNode::Children {
                tag,
                path,
                emit_empty,
                records,
                ..
            } => {
                if records.is_empty() && !emit_empty {
                    continue;
                }
                let parent = element.descend_or_create(path);
                for child in records {
                    parent.children.push(render_record(tag, child, options));
                }
            }
        }
    }
}

/// Adds the rows of a record tree to per-table counts
pub fn count_rows(record: &Record, counts: &mut IndexMap<String, usize>) {
    *counts.entry(record.table.to_string()).or_default() += 1;
    for node in &record.nodes {
        if let RecordNode::Children { records, .. } = node {
            for child in records {
                count_rows(child, counts);
            }
        }
    }
}
