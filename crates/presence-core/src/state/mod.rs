// # Status Store
//
// In-memory storage for the single status record. Nothing is persisted
// across restarts.

pub mod memory;

pub use memory::{StatusReader, StatusRecord, StatusStore};
