//! Document walk: XML elements back into relational rows
//!
//! Each row element yields one row of its table. Attributes become
//! `_attr_<name>` fields and leaf children become fields. Elements named by
//! a child mapping (the first wrapper tag, or the child tag itself) are
//! followed into the child table, whose association column is filled from
//! the parent row.

use crate::config::RepeatedTagPolicy;
use crate::core::registry::FieldRegistry;
use crate::domain::document::XmlElement;
use crate::domain::errors::{ParseError, ValidationIssue};
use crate::domain::ids::Variant;
use crate::domain::row::{attribute_field, Row, RowBatch};
use crate::schema::SchemaNode;
use indexmap::IndexMap;

/// How repeated leaves are folded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub repeated: RepeatedTagPolicy,
    pub separator: String,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            repeated: RepeatedTagPolicy::Join,
            separator: "||".to_string(),
        }
    }
}

/// Rows and structural findings of one document
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Rows per physical table, root table first then tree order
    pub batch: RowBatch,

    /// Structural problems; errors block the import
    pub issues: Vec<ValidationIssue>,

    /// Blacklisted fields dropped
    pub dropped_fields: usize,
}

/// Walks a parsed document against a schema tree
pub struct DocumentWalker<'a> {
    root: &'a SchemaNode,
    registry: &'a FieldRegistry,
    variant: Option<&'a Variant>,
    options: &'a WalkOptions,
}

impl<'a> DocumentWalker<'a> {
    pub fn new(
        root: &'a SchemaNode,
        registry: &'a FieldRegistry,
        variant: Option<&'a Variant>,
        options: &'a WalkOptions,
    ) -> Self {
        Self {
            root,
            registry,
            variant,
            options,
        }
    }

    /// Extracts every row of the document
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnexpectedRoot`] when the document root doesn't
    /// carry the schema's root tag. Everything else is reported as issues.
    pub fn walk(&self, document: &XmlElement) -> Result<WalkOutcome, ParseError> {
        let root_tag = self.root.root_tag.as_deref().unwrap_or_default();
        if document.name != root_tag {
            return Err(ParseError::UnexpectedRoot {
                expected: root_tag.to_string(),
                found: document.name.clone(),
            });
        }

        let mut outcome = WalkOutcome::default();
        for node in self.root.walk() {
            outcome.batch.ensure_table(node.store_table());
        }

        match &self.root.item_tag {
            Some(item_tag) => {
                for child in &document.children {
                    if &child.name == item_tag {
                        self.walk_row(self.root, child, None, &[], &mut outcome);
                    } else {
                        outcome.issues.push(
                            ValidationIssue::warning(
                                self.root.store_table().as_str(),
                                format!("Ignoring <{}> under <{}>", child.name, root_tag),
                            )
                            .with_field(child.name.as_str()),
                        );
                    }
                }
            }
            None => {
                let skip: Vec<&str> = self
                    .root
                    .root_attr
                    .iter()
                    .map(|(key, _)| key.as_str())
                    .collect();
                self.walk_row(self.root, document, None, &skip, &mut outcome);
            }
        }

        tracing::debug!(
            table = %self.root.table,
            rows = outcome.batch.total_rows(),
            issues = outcome.issues.len(),
            dropped = outcome.dropped_fields,
            "Document walked"
        );
        Ok(outcome)
    }

    fn walk_row(
        &self,
        node: &SchemaNode,
        element: &XmlElement,
        link: Option<(&str, &str)>,
        skip_attributes: &[&str],
        outcome: &mut WalkOutcome,
    ) {
        let table = node.store_table();
        let index = outcome.batch.rows(table).len();
        let mut raw = Row::new();

        for (name, value) in &element.attributes {
            if !skip_attributes.contains(&name.as_str()) {
                raw.insert(attribute_field(name), Some(value.clone()));
            }
        }

        let structural = node.structural_tags();
        let mut leaves: IndexMap<&str, Vec<&XmlElement>> = IndexMap::new();
        for child in &element.children {
            if structural.contains(child.name.as_str()) {
                continue;
            }
            if !child.is_leaf() {
                outcome.issues.push(
                    ValidationIssue::warning(
                        table.as_str(),
                        "Nested element has no mapping; ignored",
                    )
                    .with_field(child.name.as_str())
                    .with_row(index),
                );
                continue;
            }
            leaves.entry(child.name.as_str()).or_default().push(child);
        }

        for (name, elements) in leaves {
            let value = self.fold_leaves(table.as_str(), name, &elements, index, outcome);
            raw.insert(name, value);
        }

        // rebuilt from the parent, whatever the element said
        if let Some((column, value)) = link {
            raw.insert(column, Some(value.to_string()));
        }

        // children are linked through raw keys, blacklisted or not
        let mut row = Row::new();
        for (field, value) in raw.iter() {
            if self.registry.should_filter(table.as_str(), field) {
                outcome.dropped_fields += 1;
            } else {
                row.insert(field, value.map(str::to_string));
            }
        }
        outcome.batch.push(table, row);

        for mapping in node.mappings() {
            let Some(container) = element.descend(&mapping.path) else {
                continue;
            };
            let children: Vec<&XmlElement> = container.children_named(&mapping.tag).collect();
            if children.is_empty() {
                continue;
            }

            let key = raw
                .value(&mapping.association.parent_key)
                .or_else(|| self.variant.map(Variant::as_str));
            let Some(key) = key else {
                outcome.issues.push(
                    ValidationIssue::error(
                        mapping.child.store_table().as_str(),
                        format!(
                            "Missing association key: <{}> children need '{}' from the parent row",
                            mapping.tag, mapping.association.parent_key
                        ),
                    )
                    .with_field(mapping.association.parent_key.as_str())
                    .with_row(index),
                );
                continue;
            };

            for child in children {
                self.walk_row(
                    &mapping.child,
                    child,
                    Some((mapping.association.child_key.as_str(), key)),
                    &[],
                    outcome,
                );
            }
        }
    }

    fn fold_leaves(
        &self,
        table: &str,
        name: &str,
        elements: &[&XmlElement],
        index: usize,
        outcome: &mut WalkOutcome,
    ) -> Option<String> {
        let value_of = |e: &XmlElement| (!e.is_null()).then(|| e.text_or_empty().to_string());

        if let [single] = elements {
            return value_of(*single);
        }

        match self.options.repeated {
            RepeatedTagPolicy::Join => {
                let values: Vec<String> = elements.iter().filter_map(|e| value_of(*e)).collect();
                (!values.is_empty()).then(|| values.join(&self.options.separator))
            }
            RepeatedTagPolicy::First => elements.first().and_then(|e| value_of(*e)),
            RepeatedTagPolicy::Reject => {
                outcome.issues.push(
                    ValidationIssue::error(
                        table,
                        format!("<{name}> repeated {} times", elements.len()),
                    )
                    .with_field(name)
                    .with_row(index),
                );
                elements.first().and_then(|e| value_of(*e))
            }
        }
    }
}
