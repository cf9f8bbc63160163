//! Schema tree: one root table and its nested child-table mappings

use crate::domain::errors::ConfigError;
use crate::domain::ids::{TableName, Variant};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// How a child row is linked to its parent row
///
/// Written either as a single shared column name (`item_id`) or as
/// `parent_key>child_key` when the columns differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Association {
    /// Column read from the parent row
    pub parent_key: String,

    /// Column of the child table holding the parent's key
    pub child_key: String,
}

impl Association {
    /// Parses an association expression
    ///
    /// # Examples
    ///
    /// ```
    /// use arbor::schema::Association;
    ///
    /// let same = Association::parse("item_id").unwrap();
    /// assert_eq!(same.parent_key, "item_id");
    /// assert_eq!(same.child_key, "item_id");
    ///
    /// let split = Association::parse("id>item_id").unwrap();
    /// assert_eq!(split.parent_key, "id");
    /// assert_eq!(split.child_key, "item_id");
    ///
    /// assert!(Association::parse("a>b>c").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = expression.split('>').map(str::trim).collect();
        let (parent, child) = match parts.as_slice() {
            [key] => (*key, *key),
            [parent, child] => (*parent, *child),
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Malformed association '{expression}': expected 'key' or 'parent>child'"
                )))
            }
        };
        if parent.is_empty() || child.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Malformed association '{expression}': empty key"
            )));
        }
        Ok(Self {
            parent_key: parent.to_string(),
            child_key: child.to_string(),
        })
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parent_key == self.child_key {
            write!(f, "{}", self.parent_key)
        } else {
            write!(f, "{}>{}", self.parent_key, self.child_key)
        }
    }
}

/// One child-table mapping inside a [`SchemaNode`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Child relation's db-side name
    pub column: TableName,

    /// Tag of each repeated child element
    pub tag: String,

    /// Parent/child key link
    pub association: Association,

    /// Wrapper tags created before the repeated child tag
    pub path: Vec<String>,

    /// Emit the wrapper path even when the parent has no children
    pub emit_empty: bool,

    /// Mapping for the child table itself
    pub child: SchemaNode,
}

impl FieldMapping {
    /// Splits a colon-separated insertion path
    pub fn parse_path(path: &str) -> Vec<String> {
        path.split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct MappingIndex {
    by_column: HashMap<String, usize>,
    by_tag: HashMap<String, usize>,
}

/// Recursive mapping between a table and an XML subtree
///
/// The root node carries the document's `root_tag` and, for multi-row tables,
/// the `item_tag` wrapping each row. Children are reachable only through
/// [`FieldMapping`]s, so the tree can't contain cycles.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Logical table identifier (configuration key, encoding metadata key)
    pub table: TableName,

    /// Physical table when it differs from the logical identifier
    pub real_table: Option<TableName>,

    /// Document root element (root node only)
    pub root_tag: Option<String>,

    /// Single `key=value` attribute on the document root
    pub root_attr: Option<(String, String)>,

    /// Per-row element; `None` makes the table a single-row container
    pub item_tag: Option<String>,

    /// Source query, may contain `$variant`
    pub query: String,

    mappings: Vec<FieldMapping>,
    index: OnceLock<MappingIndex>,
}

impl PartialEq for SchemaNode {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.real_table == other.real_table
            && self.root_tag == other.root_tag
            && self.root_attr == other.root_attr
            && self.item_tag == other.item_tag
            && self.query == other.query
            && self.mappings == other.mappings
    }
}

impl SchemaNode {
    /// Creates a node with no children
    pub fn new(table: TableName, query: impl Into<String>) -> Self {
        Self {
            table,
            real_table: None,
            root_tag: None,
            root_attr: None,
            item_tag: None,
            query: query.into(),
            mappings: Vec::new(),
            index: OnceLock::new(),
        }
    }

    /// Default source query for a child table
    pub fn default_query(table: &TableName) -> String {
        format!("SELECT * FROM {table}")
    }

    /// Appends a child mapping and resets the lookup index
    pub fn push_mapping(&mut self, mapping: FieldMapping) {
        self.mappings.push(mapping);
        self.index = OnceLock::new();
    }

    /// Child mappings in configuration order
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    fn index(&self) -> &MappingIndex {
        self.index.get_or_init(|| {
            let mut index = MappingIndex::default();
            for (position, mapping) in self.mappings.iter().enumerate() {
                index
                    .by_column
                    .entry(mapping.column.to_string())
                    .or_insert(position);
                index.by_tag.entry(mapping.tag.clone()).or_insert(position);
            }
            index
        })
    }

    /// Mapping whose child relation is `column`
    pub fn mapping_by_column(&self, column: &str) -> Option<&FieldMapping> {
        self.index()
            .by_column
            .get(column)
            .map(|&i| &self.mappings[i])
    }

    /// Mapping whose repeated child tag is `tag`
    pub fn mapping_by_tag(&self, tag: &str) -> Option<&FieldMapping> {
        self.index().by_tag.get(tag).map(|&i| &self.mappings[i])
    }

    /// First wrapper tag (or the child tag when there is no path) of each
    /// mapping; elements with these names are never plain fields
    pub fn structural_tags(&self) -> BTreeSet<&str> {
        self.mappings
            .iter()
            .map(|m| m.path.first().unwrap_or(&m.tag).as_str())
            .collect()
    }

    /// Physical table rows are read from and written to
    pub fn store_table(&self) -> &TableName {
        self.real_table.as_ref().unwrap_or(&self.table)
    }

    /// Whether each row gets its own `item_tag` element
    pub fn is_multi_row(&self) -> bool {
        self.item_tag.is_some()
    }

    /// Source query with `$variant` substituted
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the query references `$variant`
    /// but the job has none.
    pub fn query_for(&self, variant: Option<&Variant>) -> Result<String, ConfigError> {
        if !self.query.contains(Variant::PLACEHOLDER) {
            return Ok(self.query.clone());
        }
        match variant {
            Some(v) => Ok(self.query.replace(Variant::PLACEHOLDER, v.as_str())),
            None => Err(ConfigError::Invalid(format!(
                "Query for '{}' requires a variant",
                self.table
            ))),
        }
    }

    /// This node and every descendant, depth-first in configuration order
    pub fn walk(&self) -> Vec<&SchemaNode> {
        let mut nodes = vec![self];
        for mapping in &self.mappings {
            nodes.extend(mapping.child.walk());
        }
        nodes
    }

    /// Descendant (or self) with the given logical table
    pub fn find(&self, table: &TableName) -> Option<&SchemaNode> {
        self.walk().into_iter().find(|n| &n.table == table)
    }

    /// Checks the invariants of a loaded tree
    ///
    /// Every table appears at most once and every tag is a usable XML name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root_tag = self.root_tag.as_deref().ok_or_else(|| {
            ConfigError::Invalid(format!("root_tag is required for '{}'", self.table))
        })?;
        check_tag(root_tag)?;
        if let Some(item_tag) = &self.item_tag {
            check_tag(item_tag)?;
        }
        if let Some((key, _)) = &self.root_attr {
            check_tag(key)?;
        }

        let mut seen = BTreeSet::new();
        for node in self.walk() {
            if node.query.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Source query for '{}' is empty",
                    node.table
                )));
            }
            if !seen.insert(node.store_table().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Table '{}' appears more than once in the mapping tree",
                    node.store_table()
                )));
            }
            for mapping in &node.mappings {
                check_tag(&mapping.tag)?;
                for segment in &mapping.path {
                    check_tag(segment)?;
                }
            }
        }
        Ok(())
    }
}

/// Physical names of the root table and every descendant
pub fn all_table_names(root: &SchemaNode) -> BTreeSet<String> {
    root.walk()
        .into_iter()
        .map(|n| n.store_table().to_string())
        .collect()
}

fn check_tag(tag: &str) -> Result<(), ConfigError> {
    let mut chars = tag.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("'{tag}' is not a valid XML tag")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableName {
        TableName::new(name).unwrap()
    }

    fn item_schema() -> SchemaNode {
        let mut root = SchemaNode::new(table("item"), "SELECT * FROM item ORDER BY id");
        root.root_tag = Some("items".to_string());
        root.item_tag = Some("item".to_string());
        root.push_mapping(FieldMapping {
            column: table("item_tag"),
            tag: "tag".to_string(),
            association: Association::parse("id>item_id").unwrap(),
            path: FieldMapping::parse_path("tags"),
            emit_empty: false,
            child: SchemaNode::new(table("item_tag"), "SELECT * FROM item_tag"),
        });
        root
    }

    #[test]
    fn test_association_parse() {
        assert!(Association::parse("").is_err());
        assert!(Association::parse(">child").is_err());
        assert_eq!(Association::parse("a > b").unwrap().to_string(), "a>b");
        assert_eq!(Association::parse("id").unwrap().to_string(), "id");
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(FieldMapping::parse_path("a:b:c"), vec!["a", "b", "c"]);
        assert!(FieldMapping::parse_path("").is_empty());
        assert_eq!(FieldMapping::parse_path(":a:"), vec!["a"]);
    }

    #[test]
    fn test_mapping_lookup_and_reset() {
        let mut root = item_schema();
        assert!(root.mapping_by_tag("tag").is_some());
        assert!(root.mapping_by_column("item_tag").is_some());
        assert!(root.mapping_by_tag("drop").is_none());

        root.push_mapping(FieldMapping {
            column: table("item_drop"),
            tag: "drop".to_string(),
            association: Association::parse("id>item_id").unwrap(),
            path: vec![],
            emit_empty: true,
            child: SchemaNode::new(table("item_drop"), "SELECT * FROM item_drop"),
        });
        assert!(root.mapping_by_tag("drop").is_some());
    }

    #[test]
    fn test_query_for_variant() {
        let node = SchemaNode::new(table("npc"), "SELECT * FROM npc WHERE map = '$variant'");
        let variant = Variant::new("210010000").unwrap();
        assert_eq!(
            node.query_for(Some(&variant)).unwrap(),
            "SELECT * FROM npc WHERE map = '210010000'"
        );
        assert!(node.query_for(None).is_err());
    }

    #[test]
    fn test_all_table_names() {
        let names = all_table_names(&item_schema());
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["item".to_string(), "item_tag".to_string()]
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_table() {
        let mut root = item_schema();
        root.push_mapping(FieldMapping {
            column: table("item_tag"),
            tag: "other".to_string(),
            association: Association::parse("id").unwrap(),
            path: vec![],
            emit_empty: false,
            child: SchemaNode::new(table("item_tag"), "SELECT * FROM item_tag"),
        });
        assert!(root.validate().is_err());
    }

    #[test]
    fn test_validate_requires_root_tag() {
        let node = SchemaNode::new(table("item"), "SELECT * FROM item");
        assert!(node.validate().is_err());
        assert!(item_schema().validate().is_ok());
    }

    #[test]
    fn test_structural_tags() {
        let root = item_schema();
        assert!(root.structural_tags().contains("tags"));
        assert!(!root.structural_tags().contains("tag"));
    }

    #[test]
    fn test_store_table_prefers_real_name() {
        let mut node = SchemaNode::new(table("item_client"), "SELECT * FROM item");
        assert_eq!(node.store_table().as_str(), "item_client");
        node.real_table = Some(table("item"));
        assert_eq!(node.store_table().as_str(), "item");
    }
}
