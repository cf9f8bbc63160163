//! On-disk schema artifacts (TOML or JSON)
//!
//! The serde structs here mirror the file layout one-to-one; conversion into
//! a [`SchemaNode`] tree is where required fields are enforced.

use super::node::{Association, FieldMapping, SchemaNode};
use crate::domain::errors::ConfigError;
use crate::domain::ids::TableName;
use serde::{Deserialize, Serialize};

/// Top-level schema artifact
///
/// ```toml
/// table_name = "item"
/// root_tag = "items"
/// item_tag = "item"
/// sql = "SELECT * FROM item ORDER BY id"
///
/// [[list]]
/// table = "item_tag"
/// tag = "tag"
/// association = "id>item_id"
/// path = "tags"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaArtifact {
    #[serde(default)]
    pub table_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_table_name: Option<String>,

    #[serde(default)]
    pub root_tag: Option<String>,

    /// `key=value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_attr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_tag: Option<String>,

    #[serde(default)]
    pub sql: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<MappingArtifact>,
}

/// Child mapping entry of an artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingArtifact {
    #[serde(default)]
    pub table: Option<String>,

    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub association: Option<String>,

    /// Colon-separated wrapper tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    #[serde(default)]
    pub emit_empty: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<MappingArtifact>,
}

impl SchemaArtifact {
    /// Converts the artifact into a validated schema tree
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required field is absent,
    /// an association is malformed, or a table appears twice.
    pub fn into_schema(self) -> Result<SchemaNode, ConfigError> {
        let table_name = non_empty(self.table_name, "table_name", "schema")?;
        let table = parse_table(&table_name)?;
        let query = non_empty(self.sql, "sql", &table_name)?;

        let mut root = SchemaNode::new(table, query);
        root.real_table = self
            .real_table_name
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_table(&s))
            .transpose()?;
        root.root_tag = Some(non_empty(self.root_tag, "root_tag", &table_name)?);
        root.item_tag = self.item_tag.filter(|s| !s.trim().is_empty());
        root.root_attr = self
            .root_attr
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_root_attr(&s))
            .transpose()?;

        for entry in self.list {
            root.push_mapping(entry.into_mapping(&table_name)?);
        }

        root.validate()?;
        Ok(root)
    }
}

impl MappingArtifact {
    fn into_mapping(self, parent: &str) -> Result<FieldMapping, ConfigError> {
        let table_name = non_empty(self.table, "table", &format!("{parent} child"))?;
        let column = parse_table(&table_name)?;
        let tag = non_empty(self.tag, "tag", &table_name)?;
        let association = Association::parse(&non_empty(
            self.association,
            "association",
            &table_name,
        )?)?;

        let query = self
            .sql
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SchemaNode::default_query(&column));
        let mut child = SchemaNode::new(column.clone(), query);
        child.item_tag = Some(tag.clone());
        for entry in self.list {
            child.push_mapping(entry.into_mapping(&table_name)?);
        }

        Ok(FieldMapping {
            column,
            tag,
            association,
            path: self
                .path
                .as_deref()
                .map(FieldMapping::parse_path)
                .unwrap_or_default(),
            emit_empty: self.emit_empty,
            child,
        })
    }
}

fn non_empty(value: Option<String>, field: &str, owner: &str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Invalid(format!("'{field}' is required for {owner}")))
}

fn parse_table(name: &str) -> Result<TableName, ConfigError> {
    TableName::new(name).map_err(ConfigError::Invalid)
}

fn parse_root_attr(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((
            key.trim().to_string(),
            value.trim().trim_matches('"').to_string(),
        )),
        _ => Err(ConfigError::Invalid(format!(
            "root_attr '{raw}' must be of the form key=value"
        ))),
    }
}

impl SchemaNode {
    /// Parses and validates a TOML artifact
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let artifact: SchemaArtifact = toml::from_str(contents)
            .map_err(|e| ConfigError::Unreadable(format!("TOML parse error: {e}")))?;
        artifact.into_schema()
    }

    /// Parses and validates a JSON artifact
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let artifact: SchemaArtifact = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Unreadable(format!("JSON parse error: {e}")))?;
        artifact.into_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_TOML: &str = r#"
table_name = "item"
root_tag = "items"
root_attr = "generated=true"
item_tag = "item"
sql = "SELECT * FROM item ORDER BY id"

[[list]]
table = "item_tag"
tag = "tag"
association = "id>item_id"
path = "tags"

[[list.list]]
table = "item_tag_flag"
tag = "flag"
association = "tag_id"
emit_empty = true
"#;

    #[test]
    fn test_toml_artifact_builds_tree() {
        let root = SchemaNode::from_toml_str(ITEM_TOML).unwrap();
        assert_eq!(root.table.as_str(), "item");
        assert_eq!(root.root_tag.as_deref(), Some("items"));
        assert_eq!(
            root.root_attr,
            Some(("generated".to_string(), "true".to_string()))
        );

        let tags = root.mapping_by_tag("tag").unwrap();
        assert_eq!(tags.path, vec!["tags"]);
        assert_eq!(tags.association.child_key, "item_id");
        assert_eq!(tags.child.query, "SELECT * FROM item_tag");

        let flags = tags.child.mapping_by_tag("flag").unwrap();
        assert!(flags.emit_empty);
        assert_eq!(root.walk().len(), 3);
    }

    #[test]
    fn test_json_artifact() {
        let json = r#"{
            "table_name": "npc",
            "root_tag": "npcs",
            "item_tag": "npc",
            "sql": "SELECT * FROM npc WHERE map = '$variant'",
            "list": [{"table": "npc_skill", "tag": "skill", "association": "npc_id"}]
        }"#;
        let root = SchemaNode::from_json_str(json).unwrap();
        assert_eq!(root.mappings().len(), 1);
    }

    #[test]
    fn test_missing_required_fields() {
        let no_sql = "table_name = \"item\"\nroot_tag = \"items\"";
        assert!(matches!(
            SchemaNode::from_toml_str(no_sql),
            Err(ConfigError::Invalid(_))
        ));

        let no_root = "table_name = \"item\"\nsql = \"SELECT * FROM item\"";
        assert!(matches!(
            SchemaNode::from_toml_str(no_root),
            Err(ConfigError::Invalid(_))
        ));

        let no_assoc = r#"
table_name = "item"
root_tag = "items"
sql = "SELECT * FROM item"
[[list]]
table = "item_tag"
tag = "tag"
"#;
        let err = SchemaNode::from_toml_str(no_assoc).unwrap_err();
        assert!(err.to_string().contains("association"));
    }

    #[test]
    fn test_unreadable_artifact() {
        assert!(matches!(
            SchemaNode::from_toml_str("table_name = = \"x\""),
            Err(ConfigError::Unreadable(_))
        ));
    }

    #[test]
    fn test_bad_root_attr() {
        let toml = "table_name = \"item\"\nroot_tag = \"items\"\nsql = \"SELECT 1\"\nroot_attr = \"novalue\"";
        assert!(SchemaNode::from_toml_str(toml).is_err());
    }
}
