//! Compatibility rules: blacklist, value corrections and value validation
//!
//! Rules are loaded from a TOML file:
//!
//! ```toml
//! [[blacklist]]
//! field = "internal_note"          # no table: applies everywhere
//!
//! [[blacklist]]
//! table = "npc_*"
//! field = "debug_flag"
//!
//! [[correction]]
//! table = "item"
//! field = "price"
//! kind = "clamp"
//! min = 0
//! max = 99999
//!
//! [[validation]]
//! table = "item"
//! field = "quality"
//! allowed = ["common", "rare", "legend"]
//! ```

use crate::domain::errors::ConfigError;
use crate::domain::Result;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Table name pattern; `*` matches any run of characters
#[derive(Debug, Clone)]
pub struct TablePattern {
    source: String,
    regex: Option<Regex>,
}

impl TablePattern {
    /// Compiles a pattern; `None` or `*` match every table
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let source = pattern.unwrap_or("*").trim().to_string();
        if source == "*" {
            return Ok(Self { source, regex: None });
        }
        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?i)^{body}$"))
            .map_err(|e| ConfigError::Invalid(format!("table pattern '{source}': {e}")))?;
        Ok(Self {
            source,
            regex: Some(regex),
        })
    }

    /// Whether the pattern applies to every table
    pub fn is_global(&self) -> bool {
        self.regex.is_none()
    }

    /// Whether `table` matches
    pub fn matches(&self, table: &str) -> bool {
        self.regex.as_ref().map_or(true, |re| re.is_match(table))
    }

    /// Pattern text as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Built-in value correction
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Exact value mapping
    Replace { values: HashMap<String, String> },
    /// Numeric bounds; non-numeric values pass through
    Clamp { min: Option<f64>, max: Option<f64> },
    /// Maximum number of characters
    Truncate { max_chars: usize },
    Trim,
    Lowercase,
    Uppercase,
    /// Replacement for the empty string
    DefaultIfEmpty { value: String },
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl CorrectionKind {
    /// Applies the correction
    pub fn apply(&self, value: &str) -> String {
        match self {
            CorrectionKind::Replace { values } => values
                .get(value)
                .cloned()
                .unwrap_or_else(|| value.to_string()),
            CorrectionKind::Clamp { min, max } => match value.trim().parse::<f64>() {
                Ok(n) if min.is_some_and(|m| n < m) => min.map(format_number).unwrap_or_default(),
                Ok(n) if max.is_some_and(|m| n > m) => max.map(format_number).unwrap_or_default(),
                _ => value.to_string(),
            },
            CorrectionKind::Truncate { max_chars } => value.chars().take(*max_chars).collect(),
            CorrectionKind::Trim => value.trim().to_string(),
            CorrectionKind::Lowercase => value.to_lowercase(),
            CorrectionKind::Uppercase => value.to_uppercase(),
            CorrectionKind::DefaultIfEmpty { value: default } => {
                if value.is_empty() {
                    default.clone()
                } else {
                    value.to_string()
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CorrectionKind::Replace { .. } => "replace",
            CorrectionKind::Clamp { .. } => "clamp",
            CorrectionKind::Truncate { .. } => "truncate",
            CorrectionKind::Trim => "trim",
            CorrectionKind::Lowercase => "lowercase",
            CorrectionKind::Uppercase => "uppercase",
            CorrectionKind::DefaultIfEmpty { .. } => "default_if_empty",
        }
    }
}

/// Programmatic correction
pub type CorrectionFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A correction is either built in or a registered closure
#[derive(Clone)]
pub enum Correction {
    Builtin(CorrectionKind),
    Custom { name: String, apply: CorrectionFn },
}

impl Correction {
    fn apply(&self, value: &str) -> String {
        match self {
            Correction::Builtin(kind) => kind.apply(value),
            Correction::Custom { apply, .. } => apply(value),
        }
    }

    fn name(&self) -> &str {
        match self {
            Correction::Builtin(kind) => kind.name(),
            Correction::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correction::Builtin(kind) => f.debug_tuple("Builtin").field(kind).finish(),
            Correction::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

/// Which rule family a usage entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Blacklist,
    Correction,
    Validation,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleKind::Blacklist => "blacklist",
            RuleKind::Correction => "correction",
            RuleKind::Validation => "validation",
        })
    }
}

/// How often one rule fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleUsage {
    pub kind: RuleKind,
    pub table: String,
    pub field: String,
    pub detail: String,
    pub hits: u64,
}

#[derive(Debug)]
struct Counter(AtomicU64);

impl Counter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn hit(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Field excluded from both directions
#[derive(Debug)]
pub struct BlacklistRule {
    pub table: TablePattern,
    pub field: String,
    pub reason: Option<String>,
    hits: Counter,
}

impl BlacklistRule {
    fn matches(&self, table: &str, field: &str) -> bool {
        self.field.eq_ignore_ascii_case(field) && self.table.matches(table)
    }
}

/// Value rewrite applied on export
#[derive(Debug)]
pub struct CorrectionRule {
    pub table: TablePattern,
    pub field: String,
    pub correction: Correction,
    hits: Counter,
}

/// Value check producing warnings
#[derive(Debug)]
pub struct ValidationRule {
    pub table: TablePattern,
    pub field: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<usize>,
    pub allowed: Option<Vec<String>>,
    hits: Counter,
}

impl ValidationRule {
    /// First violated constraint, if any
    fn check(&self, value: &str) -> Option<String> {
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| a == value) {
                return Some(format!("value '{value}' is not one of [{}]", allowed.join(", ")));
            }
        }
        if let Some(max_length) = self.max_length {
            let length = value.chars().count();
            if length > max_length {
                return Some(format!("length {length} exceeds {max_length}"));
            }
        }
        if self.min.is_some() || self.max.is_some() {
            let Ok(n) = value.trim().parse::<f64>() else {
                return Some(format!("value '{value}' is not numeric"));
            };
            if let Some(min) = self.min.filter(|m| n < *m) {
                return Some(format!("value {value} is below {}", format_number(min)));
            }
            if let Some(max) = self.max.filter(|m| n > *m) {
                return Some(format!("value {value} is above {}", format_number(max)));
            }
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct BlacklistDefinition {
    table: Option<String>,
    field: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CorrectionDefinition {
    table: Option<String>,
    field: String,
    #[serde(flatten)]
    kind: CorrectionKind,
}

#[derive(Debug, Deserialize)]
struct ValidationDefinition {
    table: Option<String>,
    field: String,
    min: Option<f64>,
    max: Option<f64>,
    max_length: Option<usize>,
    allowed: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    blacklist: Vec<BlacklistDefinition>,
    #[serde(default)]
    correction: Vec<CorrectionDefinition>,
    #[serde(default)]
    validation: Vec<ValidationDefinition>,
}

/// Compiled rule set
#[derive(Debug, Default)]
pub struct ComplianceRules {
    blacklist: Vec<BlacklistRule>,
    corrections: Vec<CorrectionRule>,
    validations: Vec<ValidationRule>,
}

impl ComplianceRules {
    /// Empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rule set from a TOML file
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Unreadable(format!("Failed to read rules file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Create a rule set from TOML content
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML or a table pattern is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RulesFile = toml::from_str(content)
            .map_err(|e| ConfigError::Unreadable(format!("Failed to parse rules file: {e}")))?;

        let mut rules = Self::new();
        for def in file.blacklist {
            rules.add_blacklist(def.table.as_deref(), &def.field, def.reason)?;
        }
        for def in file.correction {
            rules.add_correction(def.table.as_deref(), &def.field, Correction::Builtin(def.kind))?;
        }
        for def in file.validation {
            rules.validations.push(ValidationRule {
                table: TablePattern::new(def.table.as_deref())?,
                field: def.field,
                min: def.min,
                max: def.max,
                max_length: def.max_length,
                allowed: def.allowed,
                hits: Counter::new(),
            });
        }
        Ok(rules)
    }

    /// Adds a blacklist rule
    ///
    /// # Errors
    ///
    /// Returns an error if the table pattern is invalid.
    pub fn add_blacklist(
        &mut self,
        table: Option<&str>,
        field: &str,
        reason: Option<String>,
    ) -> Result<()> {
        self.blacklist.push(BlacklistRule {
            table: TablePattern::new(table)?,
            field: field.to_string(),
            reason,
            hits: Counter::new(),
        });
        Ok(())
    }

    /// Adds a correction rule
    ///
    /// # Errors
    ///
    /// Returns an error if the table pattern is invalid.
    pub fn add_correction(
        &mut self,
        table: Option<&str>,
        field: &str,
        correction: Correction,
    ) -> Result<()> {
        self.corrections.push(CorrectionRule {
            table: TablePattern::new(table)?,
            field: field.to_string(),
            correction,
            hits: Counter::new(),
        });
        Ok(())
    }

    /// Registers a closure as a correction
    ///
    /// # Errors
    ///
    /// Returns an error if the table pattern is invalid.
    pub fn add_custom_correction<F>(
        &mut self,
        table: Option<&str>,
        field: &str,
        name: &str,
        apply: F,
    ) -> Result<()>
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.add_correction(
            table,
            field,
            Correction::Custom {
                name: name.to_string(),
                apply: Arc::new(apply),
            },
        )
    }

    /// Whether any rule exists
    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty() && self.corrections.is_empty() && self.validations.is_empty()
    }

    /// Whether a field is blacklisted for a table
    pub fn is_blacklisted(&self, table: &str, field: &str) -> bool {
        match self.blacklist.iter().find(|r| r.matches(table, field)) {
            Some(rule) => {
                rule.hits.hit();
                true
            }
            None => false,
        }
    }

    /// Applies every matching correction in declaration order
    pub fn correct(&self, table: &str, field: &str, value: &str) -> String {
        let mut current = value.to_string();
        for rule in self
            .corrections
            .iter()
            .filter(|r| r.field.eq_ignore_ascii_case(field) && r.table.matches(table))
        {
            let next = rule.correction.apply(&current);
            if next != current {
                rule.hits.hit();
                current = next;
            }
        }
        current
    }

    /// Checks a value against matching validation rules
    pub fn validate(&self, table: &str, field: &str, value: &str) -> Option<String> {
        self.validations
            .iter()
            .filter(|r| r.field.eq_ignore_ascii_case(field) && r.table.matches(table))
            .find_map(|rule| {
                let message = rule.check(value);
                if message.is_some() {
                    rule.hits.hit();
                }
                message
            })
    }

    /// Hit counts of every rule
    pub fn usage(&self) -> Vec<RuleUsage> {
        let blacklist = self.blacklist.iter().map(|r| RuleUsage {
            kind: RuleKind::Blacklist,
            table: r.table.as_str().to_string(),
            field: r.field.clone(),
            detail: r.reason.clone().unwrap_or_default(),
            hits: r.hits.get(),
        });
        let corrections = self.corrections.iter().map(|r| RuleUsage {
            kind: RuleKind::Correction,
            table: r.table.as_str().to_string(),
            field: r.field.clone(),
            detail: r.correction.name().to_string(),
            hits: r.hits.get(),
        });
        let validations = self.validations.iter().map(|r| RuleUsage {
            kind: RuleKind::Validation,
            table: r.table.as_str().to_string(),
            field: r.field.clone(),
            detail: String::new(),
            hits: r.hits.get(),
        });
        blacklist.chain(corrections).chain(validations).collect()
    }
}
