//! In-process database backend for permitdesk.
//!
//! Implements the `permitdesk-storage` traits over a [`MemoryDatabase`] whose
//! statements are scripted by the caller. Transactions are snapshot based and
//! [`Faults`] switch individual failure modes on, which makes the backend a
//! stand-in for Postgres in tests and local runs.
//!
//! # Example
//!
//! ```ignore
//! use permitdesk_db_memory::{MemoryConnector, MemoryDatabase, MemoryOutput};
//!
//! let db = MemoryDatabase::new();
//! db.on("SELECT code FROM users", |tables, _| {
//!     Ok(MemoryOutput::rows(tables.get("users").cloned().unwrap_or_default()))
//! });
//! let connector = MemoryConnector::new(db);
//! ```

mod connector;
mod database;

pub use connector::{MemoryConnector, MemoryOptions, MemoryPool, MemorySession};
pub use database::{Faults, MemoryDatabase, MemoryOutput, Tables};
