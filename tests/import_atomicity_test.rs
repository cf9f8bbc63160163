//! Integration tests for import atomicity
//!
//! These tests verify that:
//! - A failure inside the transaction leaves every table as it was
//! - Blocking validation problems stop the job before any write
//! - Dry runs and cancelled jobs never touch the tables

mod common;

use arbor::core::import::ImportJob;
use arbor::core::import::ImportCoordinator;
use arbor::core::state::ImportState;
use arbor::domain::ArborError;
use common::{seed_items, Fixture};
use tokio::sync::watch;

const DOC: &str = "<items>\
<item><id>7</id><name>Club</name><tags><tag><seq>1</seq><value>blunt</value></tag></tags></item>\
<item><id>8</id><name>Mace</name></item>\
</items>";

#[tokio::test]
async fn test_failed_child_insert_rolls_back_every_table() {
    let fx = Fixture::new();
    seed_items(&fx.store);
    let items_before = fx.store.rows("item");
    let tags_before = fx.store.rows("item_tag");

    fx.store.fail_on_insert("item_tag");
    let input = fx.write("items.xml", DOC);
    let summary = fx.import(&input).await;

    assert!(!summary.is_successful());
    assert_eq!(summary.state(), ImportState::RolledBack);
    assert!(matches!(
        summary.failure.as_ref().map(ArborError::root),
        Some(ArborError::Store(_))
    ));
    assert_eq!(fx.store.rows("item"), items_before);
    assert_eq!(fx.store.rows("item_tag"), tags_before);
}

#[tokio::test]
async fn test_unknown_column_fails_before_transaction() {
    let fx = Fixture::new();
    seed_items(&fx.store);
    let before = fx.store.rows("item");

    let input = fx.write(
        "items.xml",
        "<items><item><id>1</id><colour>red</colour></item><item><id>2</id><colour>blue</colour></item></items>",
    );
    let summary = fx.import(&input).await;

    assert_eq!(summary.state(), ImportState::FailedBeforeTransaction);
    assert!(matches!(
        summary.failure.as_ref().map(ArborError::root),
        Some(ArborError::Validation(_))
    ));
    // Reported once per column, not per row
    let colour_errors = summary
        .errors
        .iter()
        .filter(|e| e.field.as_deref() == Some("colour"))
        .count();
    assert_eq!(colour_errors, 1);
    assert_eq!(fx.store.rows("item"), before);
}

#[tokio::test]
async fn test_value_over_capacity_without_widening_fails() {
    let fx = Fixture::build(None, |c| c.import.auto_widen = false);
    let long = "x".repeat(80);
    let input = fx.write(
        "items.xml",
        format!("<items><item><id>1</id><note>{long}</note></item></items>"),
    );

    let summary = fx.import(&input).await;
    assert_eq!(summary.state(), ImportState::FailedBeforeTransaction);
    assert!(fx.store.rows("item").is_empty());
    assert_eq!(fx.store.capacity("item", "note"), Some(64));
}

#[tokio::test]
async fn test_value_over_capacity_widens_column() {
    let fx = Fixture::build(None, |c| c.import.auto_widen = true);
    let long = "x".repeat(80);
    let input = fx.write(
        "items.xml",
        format!("<items><item><id>1</id><note>{long}</note></item></items>"),
    );

    let summary = fx.import(&input).await;
    assert!(summary.is_successful(), "{:?}", summary.failure);
    assert_eq!(summary.widened_columns, 1);
    assert_eq!(fx.store.capacity("item", "note"), Some(80));
    assert_eq!(fx.store.rows("item")[0].value("note"), Some(long.as_str()));
}

#[tokio::test]
async fn test_dry_run_leaves_tables_untouched() {
    let fx = Fixture::new();
    seed_items(&fx.store);
    let before = fx.store.rows("item");

    let input = fx.write("items.xml", DOC);
    let summary = fx
        .import_job(ImportJob::new("item", input).with_dry_run(true))
        .await;

    assert!(summary.is_successful(), "{:?}", summary.failure);
    assert!(summary.dry_run);
    assert_eq!(summary.rows_per_table["item"], 2);
    assert_eq!(fx.store.rows("item"), before);
}

#[tokio::test]
async fn test_shutdown_before_transaction_cancels() {
    let fx = Fixture::new();
    seed_items(&fx.store);
    let before = fx.store.rows("item");
    let input = fx.write("items.xml", DOC);

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let summary = ImportCoordinator::new(&fx.services, rx)
        .run(ImportJob::new("item", input))
        .await;

    assert!(summary.interrupted());
    assert!(!summary.is_successful());
    assert_eq!(fx.store.rows("item"), before);
}

#[tokio::test]
async fn test_successful_import_walks_every_state() {
    let fx = Fixture::new();
    let input = fx.write("items.xml", DOC);
    let summary = fx.import(&input).await;
    assert!(summary.is_successful(), "{:?}", summary.failure);

    let states: Vec<ImportState> = summary.tracker.history().iter().map(|(s, _)| *s).collect();
    assert_eq!(states.first(), Some(&ImportState::Parsing));
    assert!(states.contains(&ImportState::Validating));
    assert!(states
        .iter()
        .any(|s| matches!(s, ImportState::Transacting(_))));
    assert_eq!(states.last(), Some(&ImportState::Committed));
}
