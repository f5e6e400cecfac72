//! Local persistence: the `Repository` capability set the pipeline depends
//! on, a JSON file store for the CLI, and an in-memory store.

pub mod json;
pub mod memory;
pub mod repository;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use repository::{Repository, StoreError};
