//! Domain identifier types with validation
//!
//! Newtype wrappers for table names and job variants. Each type ensures type
//! safety and validates its format once, at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relational table identifier
///
/// Table names are interpolated into generated SQL, so they are restricted to
/// ASCII letters, digits and underscores (optionally schema-qualified with a
/// single dot).
///
/// # Examples
///
/// ```
/// use arbor::domain::ids::TableName;
/// use std::str::FromStr;
///
/// let table = TableName::from_str("item_tag").unwrap();
/// assert_eq!(table.as_str(), "item_tag");
/// assert!(TableName::from_str("item; DROP TABLE x").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Creates a new TableName from a string
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Table name cannot be empty".to_string());
        }
        if name.split('.').count() > 2 {
            return Err(format!("Table name '{name}' has too many qualifiers"));
        }
        let valid = name.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !valid {
            return Err(format!(
                "Table name '{name}' may only contain letters, digits and underscores"
            ));
        }
        Ok(Self(name))
    }

    /// Returns the table name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Job-scoped variant parameter (e.g. a map or region identifier)
///
/// Substituted for `$variant` in source queries and used as the fallback
/// association value when a parent key is absent.
///
/// # Examples
///
/// ```
/// use arbor::domain::ids::Variant;
///
/// let variant = Variant::new("210010000").unwrap();
/// assert_eq!(variant.as_str(), "210010000");
/// assert!(Variant::new("it's").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Variant(String);

impl Variant {
    /// Placeholder replaced by the variant inside source queries
    pub const PLACEHOLDER: &'static str = "$variant";

    /// Key used for encoding metadata when a job has no variant
    pub const DEFAULT_KEY: &'static str = "default";

    /// Creates a new Variant
    ///
    /// Quotes and semicolons are rejected because the value is substituted
    /// into SQL text.
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("Variant cannot be empty".to_string());
        }
        if value.contains(['\'', '"', ';', '\\']) {
            return Err(format!("Variant '{value}' contains forbidden characters"));
        }
        Ok(Self(value))
    }

    /// Returns the variant as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Metadata key for an optional variant
    pub fn key_of(variant: Option<&Variant>) -> &str {
        variant.map(Variant::as_str).unwrap_or(Self::DEFAULT_KEY)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Variant {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Variant> for String {
    fn from(value: Variant) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_valid() {
        assert!(TableName::new("item").is_ok());
        assert!(TableName::new("public.item_tag").is_ok());
        assert!(TableName::new("npc_2").is_ok());
    }

    #[test]
    fn test_table_name_invalid() {
        assert!(TableName::new("").is_err());
        assert!(TableName::new("   ").is_err());
        assert!(TableName::new("item tag").is_err());
        assert!(TableName::new("a.b.c").is_err());
        assert!(TableName::new("item;").is_err());
        assert!(TableName::new(".item").is_err());
    }

    #[test]
    fn test_table_name_serde_roundtrip() {
        let table = TableName::new("item").unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, "\"item\"");
        let back: TableName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert!(serde_json::from_str::<TableName>("\"bad name\"").is_err());
    }

    #[test]
    fn test_variant_validation() {
        assert!(Variant::new("300030000").is_ok());
        assert!(Variant::new("").is_err());
        assert!(Variant::new("a'b").is_err());
        assert!(Variant::new("a;b").is_err());
    }

    #[test]
    fn test_variant_key_of() {
        let variant = Variant::new("map1").unwrap();
        assert_eq!(Variant::key_of(Some(&variant)), "map1");
        assert_eq!(Variant::key_of(None), "default");
    }
}
