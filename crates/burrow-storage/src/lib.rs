//! Storage backends for the Burrow URL shortener.
//!
//! Three interchangeable implementations of [`Storage`] live here: an
//! in-memory map, an append-only file and a PostgreSQL table. [`Backend`]
//! picks one of them from a [`StorageConfig`] at startup.

pub mod allocator;
pub mod backend;
pub mod delete_worker;
pub mod file;
pub mod memory;
pub mod postgres;

pub use allocator::IdAllocator;
pub use backend::{Backend, BackendKind, DeleteMode, StorageConfig};
pub use burrow_core::{Result, Storage, StorageError};
pub use delete_worker::{DeleteQueue, DeleteSink, DeleteWorker, DeleteWorkerSettings};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use postgres::{PostgresSettings, PostgresStorage};
