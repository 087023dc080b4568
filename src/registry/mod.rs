//! Audit Registry Core
//!
//! Auditors register, submit audit reports about contracts and attach findings.
//! Project owners acknowledge and resolve findings and verify or dispute reports;
//! the administrator verifies auditors and resolves disputes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ RegistryCommand │────►│ RegistryManager  │────►│ EventBus        │
//! │ (serializable)  │     │ (write guard,    │     │ (broadcast)     │
//! └─────────────────┘     │  write-ahead)    │     └─────────────────┘
//!                         └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ AuditVault       │
//!                         │ roles, auditors, │
//!                         │ ledger, journal  │
//!                         └──────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! - `Submitted -> Verified` and `Submitted -> Disputed` by the project owner
//! - `Disputed -> Resolved` by the administrator
//! - `Verified` and `Resolved` are terminal

mod auditors;
mod command;
mod error;
mod events;
mod journal;
mod ledger;
mod manager;
mod query;
mod roles;
mod scoring;
mod types;
mod vault;

pub use auditors::AuditorRegistry;
pub use command::RegistryCommand;
pub use error::{AddressError, JournalError, RecordRef, RegistryError};
pub use events::{EventBus, RegistryEvent};
pub use journal::{journal_timestamp, JournalEntry, OperationJournal, GENESIS_DIGEST};
pub use ledger::{AuditSubmission, NewFinding, ReportLedger};
pub use manager::{ExecuteError, RegistryManager};
pub use query::{QueryFacade, RegistryStats};
pub use roles::{Capabilities, Role, RoleResolver};
pub use scoring::{
    reputation_score, security_score, AuditorStats, PolicyError, ScoringPolicy, SecurityScore,
    MAX_REPUTATION, MAX_SECURITY_SCORE,
};
pub use types::{Address, AuditReport, AuditorProfile, Finding, ReportStatus, Severity};
pub use vault::{AuditVault, CommandOutcome};
