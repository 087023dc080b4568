//! Registry Manager - Main Orchestrator
//!
//! Serializes commands through a single write guard, writes each journal entry
//! ahead to PostgreSQL when a database is configured, commits it to the
//! in-memory vault, then publishes the resulting events.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::database::pool::DatabasePool;
use crate::registry::command::RegistryCommand;
use crate::registry::error::{JournalError, RegistryError};
use crate::registry::events::{EventBus, RegistryEvent};
use crate::registry::journal::JournalEntry;
use crate::registry::ledger::{AuditSubmission, NewFinding};
use crate::registry::query::{QueryFacade, RegistryStats};
use crate::registry::roles::Capabilities;
use crate::registry::scoring::{ScoringPolicy, SecurityScore};
use crate::registry::types::{Address, AuditReport, AuditorProfile, Finding};
use crate::registry::vault::{AuditVault, CommandOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Rejected(#[from] RegistryError),

    #[error("failed to persist journal entry {sequence}: {reason}")]
    Persistence { sequence: u64, reason: String },

    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Main registry manager
#[derive(Clone)]
pub struct RegistryManager {
    vault: Arc<RwLock<AuditVault>>,
    db: Option<Arc<DatabasePool>>,
    events: EventBus,
}

impl RegistryManager {
    pub fn new(administrator: Address, policy: ScoringPolicy, event_capacity: usize) -> Self {
        Self {
            vault: Arc::new(RwLock::new(AuditVault::new(administrator, policy))),
            db: None,
            events: EventBus::new(event_capacity),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Rebuild in-memory state from the persisted journal.
    ///
    /// Returns the number of entries replayed; 0 without a database.
    pub async fn restore(&self) -> Result<usize> {
        let Some(ref db) = self.db else {
            return Ok(0);
        };

        let entries = db
            .journal()
            .load_all()
            .await
            .map_err(anyhow::Error::msg)
            .context("Failed to load registry journal")?;
        let count = entries.len();

        let mut vault = self.vault.write().await;
        let restored = AuditVault::replay(vault.administrator().clone(), *vault.policy(), entries)
            .context("Registry journal failed verification")?;
        *vault = restored;

        info!(entries = count, "Registry state restored");
        Ok(count)
    }

    /// Pull entries persisted past the in-memory head.
    ///
    /// Covers an append whose acknowledgement was lost and a sequence taken
    /// by another writer; without it every later command re-stages the same
    /// sequence and fails.
    async fn resync(&self, db: &DatabasePool, vault: &mut AuditVault) {
        let local = vault.journal().next_sequence();
        let persisted = match db.journal().count().await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Could not check persisted journal length");
                return;
            }
        };
        if persisted <= local {
            return;
        }

        let tail = match db.journal().load_since(local).await {
            Ok(tail) => tail,
            Err(e) => {
                error!(local, persisted, error = %e, "Journal tail unavailable; restart required");
                return;
            }
        };

        match vault.catch_up(tail) {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    self.events.publish(&outcome.events);
                }
                warn!(
                    committed = outcomes.len(),
                    next_sequence = vault.journal().next_sequence(),
                    "Registry re-synced with persisted journal"
                );
            }
            Err(e) => {
                error!(local, persisted, error = %e, "Persisted journal diverges from memory; restart required");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Apply one command atomically
    pub async fn execute(
        &self,
        caller: &Address,
        command: RegistryCommand,
    ) -> Result<CommandOutcome, ExecuteError> {
        let command_name = command.name();
        let target = command.report_id();
        let mut vault = self.vault.write().await;

        let entry = vault.stage(caller, command, Utc::now())?;

        if let Some(ref db) = self.db {
            if let Err(reason) = db.journal().append(&entry).await {
                error!(
                    sequence = entry.sequence,
                    command = command_name,
                    error = %reason,
                    "Journal write-ahead failed; command not applied"
                );
                self.resync(db, &mut vault).await;
                return Err(ExecuteError::Persistence {
                    sequence: entry.sequence,
                    reason,
                });
            }
        }

        let outcome = vault.commit(entry)?;
        // Published under the guard so subscribers observe commit order
        self.events.publish(&outcome.events);
        drop(vault);

        debug!(
            caller = %caller,
            command = command_name,
            report_id = ?target,
            sequence = outcome.sequence,
            "Command committed"
        );

        Ok(outcome)
    }

    // ── Typed commands ──

    pub async fn register_auditor(
        &self,
        caller: &Address,
        name: String,
        profile_url: String,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::RegisterAuditor { name, profile_url })
            .await
    }

    pub async fn update_auditor_profile(
        &self,
        caller: &Address,
        name: String,
        profile_url: String,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::UpdateAuditorProfile { name, profile_url })
            .await
    }

    pub async fn verify_auditor(
        &self,
        caller: &Address,
        auditor: Address,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::VerifyAuditor { auditor })
            .await
    }

    pub async fn revoke_auditor(
        &self,
        caller: &Address,
        auditor: Address,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::RevokeAuditor { auditor })
            .await
    }

    pub async fn submit_audit(
        &self,
        caller: &Address,
        submission: AuditSubmission,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::SubmitAudit(submission))
            .await
    }

    pub async fn add_finding(
        &self,
        caller: &Address,
        report_id: u64,
        finding: NewFinding,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::AddFinding { report_id, finding })
            .await
    }

    pub async fn acknowledge_finding(
        &self,
        caller: &Address,
        report_id: u64,
        index: u64,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::AcknowledgeFinding { report_id, index })
            .await
    }

    pub async fn resolve_finding(
        &self,
        caller: &Address,
        report_id: u64,
        index: u64,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::ResolveFinding { report_id, index })
            .await
    }

    pub async fn verify_audit(
        &self,
        caller: &Address,
        report_id: u64,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::VerifyAudit { report_id })
            .await
    }

    pub async fn dispute_audit(
        &self,
        caller: &Address,
        report_id: u64,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::DisputeAudit { report_id })
            .await
    }

    pub async fn resolve_dispute(
        &self,
        caller: &Address,
        report_id: u64,
    ) -> Result<CommandOutcome, ExecuteError> {
        self.execute(caller, RegistryCommand::ResolveDispute { report_id })
            .await
    }

    // ── Queries ──

    /// Run `f` against a committed snapshot
    pub async fn read<R>(&self, f: impl FnOnce(QueryFacade<'_>) -> R) -> R {
        let vault = self.vault.read().await;
        f(vault.query())
    }

    pub async fn get_report(&self, report_id: u64) -> Result<AuditReport, RegistryError> {
        self.read(|query| query.get_report(report_id).cloned()).await
    }

    pub async fn get_findings(&self, report_id: u64) -> Result<Vec<Finding>, RegistryError> {
        self.read(|query| query.get_findings(report_id).map(<[Finding]>::to_vec))
            .await
    }

    pub async fn get_finding(&self, report_id: u64, index: u64) -> Result<Finding, RegistryError> {
        self.read(|query| query.get_finding(report_id, index).cloned())
            .await
    }

    pub async fn get_contract_audit_ids(&self, contract: &Address) -> Vec<u64> {
        self.read(|query| query.get_contract_audit_ids(contract).to_vec())
            .await
    }

    pub async fn get_auditor_report_ids(&self, auditor: &Address) -> Vec<u64> {
        self.read(|query| query.get_auditor_report_ids(auditor).to_vec())
            .await
    }

    pub async fn get_security_score(&self, contract: &Address) -> SecurityScore {
        self.read(|query| query.get_security_score(contract)).await
    }

    pub async fn auditor(&self, address: &Address) -> Result<AuditorProfile, RegistryError> {
        self.read(|query| query.require_auditor(address).cloned())
            .await
    }

    pub async fn stats(&self) -> RegistryStats {
        self.read(|query| query.stats()).await
    }

    pub async fn recent_journal(&self, limit: usize) -> Vec<JournalEntry> {
        self.read(|query| query.recent_journal(limit)).await
    }

    pub async fn capabilities(&self, caller: &Address, report_id: Option<u64>) -> Capabilities {
        let vault = self.vault.read().await;
        vault.capabilities(caller, report_id)
    }
}
