//! In-memory store
//!
//! Implements both store traits without a server. Integration tests run the
//! pipelines against it, and `database_target = "memory"` selects it for
//! dry runs seeded from a JSON file.

pub mod seed;
pub mod store;

pub use store::{InsertGate, MemoryColumn, MemoryStore, MemoryTransaction};
