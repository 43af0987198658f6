//! Core types and traits for the Burrow URL shortener.
//!
//! This crate provides the storage contract shared by every backend and
//! the HTTP gateway, together with the identifier and error types that
//! flow through it.

pub mod error;
pub mod link;
pub mod storage;
pub mod validate;

pub use error::{CoreError, Result, StorageError};
pub use link::{Created, LinkId, LinkRecord, Statistic};
pub use storage::Storage;
pub use validate::validate_urls;
