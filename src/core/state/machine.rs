//! Import job state machine
//!
//! ```text
//! Parsing -> Validating -> Transacting(Deleting -> InsertingRoot -> InsertingChildren) -> Committed
//!    |           |                         |
//!    +-----------+--> FailedBeforeTransaction   +--> RolledBack
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Step inside the write transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactPhase {
    Deleting,
    InsertingRoot,
    InsertingChildren,
}

/// Import job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Decoding and parsing the document
    Parsing,
    /// Walking rows and checking them, outside any transaction
    Validating,
    /// Inside the single write transaction
    Transacting(TransactPhase),
    /// Transaction committed
    Committed,
    /// Transaction rolled back after an error
    RolledBack,
    /// Stopped before a transaction was opened
    FailedBeforeTransaction,
}

impl Default for ImportState {
    fn default() -> Self {
        Self::Parsing
    }
}

impl ImportState {
    /// Whether the job can't move any further
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::RolledBack | Self::FailedBeforeTransaction
        )
    }

    /// Whether `next` is a legal successor
    pub fn can_transition_to(&self, next: ImportState) -> bool {
        use ImportState::*;
        use TransactPhase::*;
        matches!(
            (self, next),
            (Parsing, Validating)
                | (Parsing, FailedBeforeTransaction)
                | (Validating, Transacting(Deleting))
                | (Validating, FailedBeforeTransaction)
                // dry runs end after validation
                | (Validating, Committed)
                | (Transacting(Deleting), Transacting(InsertingRoot))
                | (Transacting(InsertingRoot), Transacting(InsertingChildren))
                | (Transacting(InsertingRoot), Committed)
                | (Transacting(InsertingChildren), Committed)
                | (Transacting(_), RolledBack)
        )
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsing => write!(f, "parsing"),
            Self::Validating => write!(f, "validating"),
            Self::Transacting(TransactPhase::Deleting) => write!(f, "transacting/deleting"),
            Self::Transacting(TransactPhase::InsertingRoot) => {
                write!(f, "transacting/inserting_root")
            }
            Self::Transacting(TransactPhase::InsertingChildren) => {
                write!(f, "transacting/inserting_children")
            }
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::FailedBeforeTransaction => write!(f, "failed_before_transaction"),
        }
    }
}

/// Current state plus the time each state was entered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTracker {
    state: ImportState,
    history: Vec<(ImportState, DateTime<Utc>)>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            state: ImportState::Parsing,
            history: vec![(ImportState::Parsing, Utc::now())],
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn history(&self) -> &[(ImportState, DateTime<Utc>)] {
        &self.history
    }

    /// Moves to `next`
    ///
    /// Illegal transitions are ignored and logged; the state is unchanged.
    pub fn advance(&mut self, next: ImportState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                from = %self.state,
                to = %next,
                "Ignoring illegal import state transition"
            );
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "Import state");
        self.state = next;
        self.history.push((next, Utc::now()));
        true
    }

    /// Terminal failure state for the current position
    ///
    /// Failures inside the transaction roll back; anything earlier never
    /// touched the store.
    pub fn fail(&mut self) -> ImportState {
        let next = match self.state {
            ImportState::Transacting(_) => ImportState::RolledBack,
            _ => ImportState::FailedBeforeTransaction,
        };
        self.advance(next);
        self.state
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
