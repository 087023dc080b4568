//! AuditVault Registry
//!
//! Registry of smart-contract security audits: auditor profiles with derived
//! reputation, audit reports with findings and a small review lifecycle, and
//! per-contract security scores.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── registry/      - Registry core
//! │   ├── types.rs      - Addresses, profiles, reports, findings
//! │   ├── roles.rs      - Caller role resolution
//! │   ├── auditors.rs   - Auditor registry
//! │   ├── ledger.rs     - Report ledger and lifecycle
//! │   ├── scoring.rs    - Reputation and security scores
//! │   ├── command.rs    - Serializable commands
//! │   ├── journal.rs    - Digest-chained operation journal
//! │   ├── vault.rs      - State-transition function
//! │   ├── query.rs      - Read-only queries
//! │   ├── events.rs     - Notifications
//! │   └── manager.rs    - Async orchestrator
//! ├── api/           - HTTP API endpoints
//! │   ├── registry.rs   - Registry API
//! │   └── middleware.rs - Auth, rate limiting, headers, logging
//! └── database/      - PostgreSQL journal persistence
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod registry;

// Re-export main types for convenience
pub use config::VaultConfig;
pub use database::{DatabasePool, JournalRepository};

pub use registry::{
    Address, AuditReport, AuditSubmission, AuditVault, AuditorProfile, Capabilities,
    CommandOutcome, EventBus, ExecuteError, Finding, JournalEntry, JournalError, NewFinding,
    RegistryCommand, RegistryError, RegistryEvent, RegistryManager, RegistryStats, ReportStatus,
    Role, ScoringPolicy, SecurityScore, Severity,
};

// Re-export API types
pub use api::{RegistryApiState, SecurityMiddlewareConfig, SecurityState, create_registry_router};
