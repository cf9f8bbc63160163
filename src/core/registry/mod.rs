//! Field order and compatibility registry
//!
//! Holds the canonical column order of every table (read from store
//! metadata) together with the [`ComplianceRules`]. One registry is built per
//! process and shared by both pipelines.

pub mod rules;

pub use rules::{
    ComplianceRules, Correction, CorrectionKind, RuleKind, RuleUsage, TablePattern,
};

use crate::adapters::database::traits::RelationalStore;
use crate::domain::ids::TableName;
use crate::domain::row::ATTRIBUTE_PREFIX;
use crate::domain::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Ordinals = HashMap<String, u32>;

/// Rank of an identifier field, `None` for ordinary fields
fn identifier_rank(field: &str) -> Option<u8> {
    if field
        .strip_prefix(ATTRIBUTE_PREFIX)
        .is_some_and(|name| name.eq_ignore_ascii_case("id"))
    {
        Some(0)
    } else if field.eq_ignore_ascii_case("id") {
        Some(1)
    } else {
        None
    }
}

/// Field order and compliance registry
pub struct FieldRegistry {
    store: Arc<dyn RelationalStore>,
    rules: ComplianceRules,
    orders: parking_lot::Mutex<HashMap<String, Arc<OnceCell<Ordinals>>>>,
}

impl FieldRegistry {
    /// Creates a registry reading column metadata from `store`
    pub fn new(store: Arc<dyn RelationalStore>, rules: ComplianceRules) -> Self {
        Self {
            store,
            rules,
            orders: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// The compliance rules
    pub fn rules(&self) -> &ComplianceRules {
        &self.rules
    }

    fn cell(&self, table: &str) -> Arc<OnceCell<Ordinals>> {
        self.orders
            .lock()
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    /// Loads the column order of a table unless already cached
    ///
    /// Concurrent callers for the same table wait for a single metadata query.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata query fails; nothing is cached then.
    pub async fn preload(&self, table: &TableName) -> Result<()> {
        let cell = self.cell(table.as_str());
        cell.get_or_try_init(|| async {
            let ordinals = self.store.column_ordinals(table).await?;
            tracing::debug!(table = %table, columns = ordinals.len(), "Field order loaded");
            Ok::<_, crate::domain::ArborError>(ordinals.into_iter().collect::<Ordinals>())
        })
        .await?;
        Ok(())
    }

    /// Preloads several tables
    ///
    /// # Errors
    ///
    /// Returns the first metadata error.
    pub async fn preload_all<'a>(
        &self,
        tables: impl IntoIterator<Item = &'a TableName>,
    ) -> Result<()> {
        for table in tables {
            self.preload(table).await?;
        }
        Ok(())
    }

    /// Drops cached field order for one table, or all of them
    pub fn invalidate(&self, table: Option<&TableName>) {
        let mut orders = self.orders.lock();
        match table {
            Some(table) => {
                orders.remove(table.as_str());
            }
            None => orders.clear(),
        }
    }

    /// Whether the field order of a table is cached
    pub fn is_loaded(&self, table: &str) -> bool {
        self.orders
            .lock()
            .get(table)
            .is_some_and(|cell| cell.initialized())
    }

    /// Blacklist-filtered fields in canonical order
    ///
    /// Identifier fields (`_attr_id`, then `id`) come first, then fields
    /// with a known ordinal by ordinal, then unknown fields in input order.
    /// Without cached metadata the input order is kept.
    pub fn ordered_fields<'a, I>(&self, table: &str, fields: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cell = self.orders.lock().get(table).cloned();
        let ordinals = cell.as_ref().and_then(|cell| cell.get());

        let mut keyed: Vec<((u8, u8, u32, usize), &str)> = fields
            .into_iter()
            .filter(|field| !self.rules.is_blacklisted(table, field))
            .enumerate()
            .map(|(position, field)| {
                let key = match identifier_rank(field) {
                    Some(rank) => (0, rank, 0, position),
                    None => match ordinals.and_then(|o| o.get(field)) {
                        Some(ordinal) => (1, 0, *ordinal, position),
                        None => (2, 0, 0, position),
                    },
                };
                (key, field)
            })
            .collect();
        keyed.sort_by_key(|(key, _)| *key);
        keyed.into_iter().map(|(_, field)| field.to_string()).collect()
    }

    /// Whether a field is blacklisted for a table
    pub fn should_filter(&self, table: &str, field: &str) -> bool {
        self.rules.is_blacklisted(table, field)
    }

    /// Applies correction rules to a value
    pub fn correct(&self, table: &str, field: &str, value: &str) -> String {
        self.rules.correct(table, field, value)
    }

    /// Checks a value against validation rules, returning a warning message
    pub fn validate_value(&self, table: &str, field: &str, value: &str) -> Option<String> {
        self.rules.validate(table, field, value)
    }

    /// How often each rule fired so far
    pub fn usage_report(&self) -> Vec<RuleUsage> {
        self.rules.usage()
    }

    /// Logs rules that fired at least once
    pub fn log_usage(&self) {
        for usage in self.usage_report().into_iter().filter(|u| u.hits > 0) {
            tracing::info!(
                rule = %usage.kind,
                table = %usage.table,
                field = %usage.field,
                detail = %usage.detail,
                hits = usage.hits,
                "Compliance rule usage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    fn registry(rules: ComplianceRules) -> (Arc<MemoryStore>, FieldRegistry) {
        let store = Arc::new(MemoryStore::new());
        store.create_text_table("item", &["name", "price", "id", "weight"]);
        (store.clone(), FieldRegistry::new(store, rules))
    }

    fn item() -> TableName {
        TableName::new("item").unwrap()
    }

    #[tokio::test]
    async fn test_ordered_by_ordinal_with_identifiers_first() {
        let (_, registry) = registry(ComplianceRules::new());
        registry.preload(&item()).await.unwrap();
        let ordered = registry.ordered_fields(
            "item",
            ["extra", "weight", "price", "ID", "name", "_attr_id"],
        );
        assert_eq!(ordered, vec!["_attr_id", "ID", "name", "price", "weight", "extra"]);
    }

    #[tokio::test]
    async fn test_input_order_without_metadata() {
        let (_, registry) = registry(ComplianceRules::new());
        let ordered = registry.ordered_fields("item", ["weight", "name", "id"]);
        assert_eq!(ordered, vec!["id", "weight", "name"]);
    }

    #[tokio::test]
    async fn test_blacklist_applied_before_ordering() {
        let mut rules = ComplianceRules::new();
        rules.add_blacklist(Some("item"), "price", None).unwrap();
        let (_, registry) = registry(rules);
        registry.preload(&item()).await.unwrap();
        let ordered = registry.ordered_fields("item", ["price", "name"]);
        assert_eq!(ordered, vec!["name"]);
        assert!(registry.should_filter("item", "price"));
        assert_eq!(registry.usage_report()[0].hits, 2);
    }

    #[tokio::test]
    async fn test_invalidate_picks_up_new_columns() {
        let (store, registry) = registry(ComplianceRules::new());
        registry.preload(&item()).await.unwrap();
        assert!(registry.is_loaded("item"));

        store.create_text_table("item", &["weight", "name"]);
        registry.invalidate(Some(&item()));
        assert!(!registry.is_loaded("item"));
        registry.preload(&item()).await.unwrap();
        assert_eq!(registry.ordered_fields("item", ["name", "weight"]), vec!["weight", "name"]);
    }

    #[tokio::test]
    async fn test_concurrent_preload_is_deterministic() {
        let (_, registry) = registry(ComplianceRules::new());
        let registry = Arc::new(registry);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.preload(&item()).await.unwrap();
                registry.ordered_fields("item", ["weight", "name", "price"])
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec!["name", "price", "weight"]);
        }
    }
}
