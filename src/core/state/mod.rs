//! Job state tracking
//!
//! Import jobs move through a fixed set of states; the tracker records when
//! each one was entered so summaries can report where a job stopped.

pub mod machine;

pub use machine::{ImportState, StateTracker, TransactPhase};
