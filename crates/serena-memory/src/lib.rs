//! # serena-memory
//!
//! In-memory subscription store. Thread-safe, process-local, and gone when
//! dropped. Used by tests and local development.

pub mod store;

pub use store::MemoryStore;
