//! PostgreSQL Database Module
//!
//! Write-ahead persistence for the registry operation journal.

pub mod journal;
pub mod pool;

pub use journal::JournalRepository;
pub use pool::DatabasePool;
