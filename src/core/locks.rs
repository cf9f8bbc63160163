//! Per-table reader/writer locks
//!
//! Exports hold read locks and imports hold write locks on every table of
//! their mapping tree, so an import never rewrites tables an export is
//! reading. Locks are always taken in sorted table order.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Guards held for the duration of a job
#[derive(Debug)]
pub enum TableGuard {
    Read(Vec<OwnedRwLockReadGuard<()>>),
    Write(Vec<OwnedRwLockWriteGuard<()>>),
}

impl TableGuard {
    /// Number of tables locked
    pub fn len(&self) -> usize {
        match self {
            TableGuard::Read(guards) => guards.len(),
            TableGuard::Write(guards) => guards.len(),
        }
    }

    /// Whether no table is locked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of one `RwLock` per table name
#[derive(Debug, Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, table: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    /// Shared access to every table in `tables`
    pub async fn read(&self, tables: &BTreeSet<String>) -> TableGuard {
        let mut guards = Vec::with_capacity(tables.len());
        for table in tables {
            guards.push(self.lock_for(table).read_owned().await);
        }
        tracing::trace!(tables = tables.len(), "Read locks acquired");
        TableGuard::Read(guards)
    }

    /// Exclusive access to every table in `tables`
    pub async fn write(&self, tables: &BTreeSet<String>) -> TableGuard {
        let mut guards = Vec::with_capacity(tables.len());
        for table in tables {
            guards.push(self.lock_for(table).write_owned().await);
        }
        tracing::trace!(tables = tables.len(), "Write locks acquired");
        TableGuard::Write(guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_readers_share() {
        let locks = TableLocks::new();
        let first = locks.read(&tables(&["item", "item_tag"])).await;
        let second = locks.read(&tables(&["item"])).await;
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_writer_waits_for_readers() {
        let locks = Arc::new(TableLocks::new());
        let reader = locks.read(&tables(&["item"])).await;

        let pending = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.write(&tables(&["item", "item_tag"])).await.len() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(reader);
        assert_eq!(pending.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disjoint_tables_do_not_block() {
        let locks = TableLocks::new();
        let _writer = locks.write(&tables(&["item"])).await;
        let other = tokio::time::timeout(Duration::from_millis(100), locks.write(&tables(&["npc"])))
            .await
            .unwrap();
        assert!(!other.is_empty());
    }
}
