//! AuditVault - the registry state-transition function
//!
//! Composes the role resolver, auditor registry, report ledger and operation
//! journal. All mutation goes through one of two doors:
//!
//! - `apply(caller, command, now)` for live commands, and
//! - `commit(entry)` for journal entries that were staged earlier (write-ahead)
//!   or are being replayed from storage.
//!
//! Both validate every precondition before touching state, so a command either
//! commits completely (one journal entry, its events) or not at all.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::auditors::AuditorRegistry;
use crate::registry::command::RegistryCommand;
use crate::registry::error::{JournalError, RecordRef, RegistryError};
use crate::registry::events::RegistryEvent;
use crate::registry::journal::{JournalEntry, OperationJournal};
use crate::registry::ledger::{AuditSubmission, NewFinding, ReportLedger};
use crate::registry::query::QueryFacade;
use crate::registry::roles::{Capabilities, RoleResolver};
use crate::registry::scoring::ScoringPolicy;
use crate::registry::types::{Address, ReportStatus};

/// Result of a committed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Position in the global operation sequence
    pub sequence: u64,
    /// Set by `submit_audit`
    pub report_id: Option<u64>,
    /// Set by `add_finding`
    pub finding_index: Option<u64>,
    pub events: Vec<RegistryEvent>,
}

#[derive(Default)]
struct Effects {
    report_id: Option<u64>,
    finding_index: Option<u64>,
    events: Vec<RegistryEvent>,
}

pub struct AuditVault {
    roles: RoleResolver,
    auditors: AuditorRegistry,
    ledger: ReportLedger,
    journal: OperationJournal,
}

impl AuditVault {
    pub fn new(administrator: Address, policy: ScoringPolicy) -> Self {
        Self {
            roles: RoleResolver::new(administrator),
            auditors: AuditorRegistry::new(policy),
            ledger: ReportLedger::new(),
            journal: OperationJournal::new(),
        }
    }

    /// Rebuild a vault from a persisted journal, verifying the digest chain
    pub fn replay<I>(
        administrator: Address,
        policy: ScoringPolicy,
        entries: I,
    ) -> Result<Self, JournalError>
    where
        I: IntoIterator<Item = JournalEntry>,
    {
        let mut vault = Self::new(administrator, policy);
        for entry in entries {
            vault.commit(entry)?;
        }
        info!(
            entries = vault.journal.len(),
            reports = vault.ledger.next_report_id(),
            auditors = vault.auditors.len(),
            "Registry replayed from journal"
        );
        Ok(vault)
    }

    /// Commit persisted entries this vault has not seen yet.
    ///
    /// Entries below the local next sequence are skipped; the rest must
    /// continue the chain. Returns the outcome of each newly committed entry.
    pub fn catch_up<I>(&mut self, entries: I) -> Result<Vec<CommandOutcome>, JournalError>
    where
        I: IntoIterator<Item = JournalEntry>,
    {
        let mut outcomes = Vec::new();
        for entry in entries {
            if entry.sequence < self.journal.next_sequence() {
                continue;
            }
            outcomes.push(self.commit(entry)?);
        }
        if !outcomes.is_empty() {
            info!(
                committed = outcomes.len(),
                next_sequence = self.journal.next_sequence(),
                "Registry caught up with persisted journal"
            );
        }
        Ok(outcomes)
    }

    pub fn administrator(&self) -> &Address {
        self.roles.administrator()
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    pub fn auditors(&self) -> &AuditorRegistry {
        &self.auditors
    }

    pub fn ledger(&self) -> &ReportLedger {
        &self.ledger
    }

    pub fn journal(&self) -> &OperationJournal {
        &self.journal
    }

    pub fn policy(&self) -> &ScoringPolicy {
        self.auditors.policy()
    }

    pub fn query(&self) -> QueryFacade<'_> {
        QueryFacade::new(self)
    }

    /// Roles `caller` holds, optionally relative to one report
    pub fn capabilities(&self, caller: &Address, report_id: Option<u64>) -> Capabilities {
        let report = report_id.and_then(|id| self.ledger.report(id));
        self.roles.resolve(caller, &self.auditors, report)
    }

    /// Run every precondition of `command` without mutating anything
    pub fn preflight(&self, caller: &Address, command: &RegistryCommand) -> Result<(), RegistryError> {
        match command {
            RegistryCommand::RegisterAuditor { .. } => self.auditors.check_register(caller),
            RegistryCommand::UpdateAuditorProfile { .. } => self.auditors.check_exists(caller),
            RegistryCommand::VerifyAuditor { auditor } | RegistryCommand::RevokeAuditor { auditor } => {
                self.roles
                    .require_administrator(caller, "change auditor verification")?;
                self.auditors.check_exists(auditor)
            }
            RegistryCommand::SubmitAudit(submission) => self
                .ledger
                .check_submit(&self.roles, &self.auditors, caller, submission)
                .map(|_| ()),
            RegistryCommand::AddFinding { report_id, finding } => self
                .ledger
                .check_add_finding(&self.roles, caller, *report_id, finding.severity)
                .map(|_| ()),
            RegistryCommand::AcknowledgeFinding { report_id, index } => self
                .ledger
                .check_finding_owner(&self.roles, caller, *report_id, *index, "acknowledge findings"),
            RegistryCommand::ResolveFinding { report_id, index } => self
                .ledger
                .check_finding_owner(&self.roles, caller, *report_id, *index, "resolve findings"),
            RegistryCommand::VerifyAudit { report_id } => {
                self.ledger
                    .check_transition(&self.roles, caller, *report_id, ReportStatus::Verified)
            }
            RegistryCommand::DisputeAudit { report_id } => {
                self.ledger
                    .check_transition(&self.roles, caller, *report_id, ReportStatus::Disputed)
            }
            RegistryCommand::ResolveDispute { report_id } => {
                self.ledger
                    .check_transition(&self.roles, caller, *report_id, ReportStatus::Resolved)
            }
        }
    }

    /// Validate `command` and build the journal entry that would commit it
    pub fn stage(
        &self,
        caller: &Address,
        command: RegistryCommand,
        now: DateTime<Utc>,
    ) -> Result<JournalEntry, RegistryError> {
        if let Err(err) = self.preflight(caller, &command) {
            debug!(
                caller = %caller,
                command = command.name(),
                kind = err.kind(),
                "Command rejected"
            );
            return Err(err);
        }
        Ok(self.journal.draft(caller, command, now))
    }

    /// Commit a staged or replayed entry at the journal head
    pub fn commit(&mut self, entry: JournalEntry) -> Result<CommandOutcome, JournalError> {
        self.journal.check_continuity(&entry)?;
        let sequence = entry.sequence;
        self.commit_unchecked(entry).map_err(|source| {
            warn!(sequence, error = %source, "Journal entry rejected");
            JournalError::Rejected { sequence, source }
        })
    }

    /// Validate and commit a live command
    pub fn apply(
        &mut self,
        caller: &Address,
        command: RegistryCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        let entry = self.stage(caller, command, now)?;
        self.commit_unchecked(entry)
    }

    fn commit_unchecked(&mut self, entry: JournalEntry) -> Result<CommandOutcome, RegistryError> {
        let effects = self.execute(&entry.caller, entry.command.clone(), entry.committed_at)?;
        let sequence = entry.sequence;
        self.journal.append(entry);

        Ok(CommandOutcome {
            sequence,
            report_id: effects.report_id,
            finding_index: effects.finding_index,
            events: effects.events,
        })
    }

    fn execute(
        &mut self,
        caller: &Address,
        command: RegistryCommand,
        now: DateTime<Utc>,
    ) -> Result<Effects, RegistryError> {
        let mut effects = Effects::default();

        match command {
            RegistryCommand::RegisterAuditor { name, profile_url } => {
                self.auditors.register(caller, name.clone(), profile_url, now)?;
                effects.events.push(RegistryEvent::AuditorRegistered {
                    auditor: caller.clone(),
                    name,
                });
            }
            RegistryCommand::UpdateAuditorProfile { name, profile_url } => {
                self.auditors.update_profile(caller, name, profile_url)?;
            }
            RegistryCommand::VerifyAuditor { auditor } => {
                self.roles
                    .require_administrator(caller, "change auditor verification")?;
                self.auditors.set_verified(&auditor, true)?;
            }
            RegistryCommand::RevokeAuditor { auditor } => {
                self.roles
                    .require_administrator(caller, "change auditor verification")?;
                self.auditors.set_verified(&auditor, false)?;
            }
            RegistryCommand::SubmitAudit(submission) => {
                let contract_address = submission.contract_address.clone();
                let report_id =
                    self.ledger
                        .submit(&self.roles, &mut self.auditors, caller, submission, now)?;
                let security_score = self
                    .ledger
                    .report(report_id)
                    .map(|report| report.security_score)
                    .unwrap_or_default();

                effects.report_id = Some(report_id);
                effects.events.push(RegistryEvent::AuditSubmitted {
                    report_id,
                    contract_address,
                    auditor: caller.clone(),
                    security_score,
                });
            }
            RegistryCommand::AddFinding { report_id, finding } => {
                let title = finding.title.clone();
                let index =
                    self.ledger
                        .add_finding(&self.roles, &mut self.auditors, caller, report_id, finding)?;
                let severity = self.ledger.finding(report_id, index)?.severity;

                effects.finding_index = Some(index);
                effects.events.push(RegistryEvent::FindingAdded {
                    report_id,
                    finding_index: index,
                    severity,
                    title,
                });
            }
            RegistryCommand::AcknowledgeFinding { report_id, index } => {
                self.ledger
                    .acknowledge_finding(&self.roles, caller, report_id, index)?;
            }
            RegistryCommand::ResolveFinding { report_id, index } => {
                self.ledger
                    .resolve_finding(&self.roles, caller, report_id, index)?;
            }
            RegistryCommand::VerifyAudit { report_id } => {
                self.ledger.verify_audit(&self.roles, caller, report_id)?;
            }
            RegistryCommand::DisputeAudit { report_id } => {
                self.ledger.dispute_audit(&self.roles, caller, report_id)?;
            }
            RegistryCommand::ResolveDispute { report_id } => {
                self.ledger.resolve_dispute(&self.roles, caller, report_id)?;
            }
        }

        Ok(effects)
    }

    // ── Typed commands ──

    pub fn register_auditor(
        &mut self,
        caller: &Address,
        name: &str,
        profile_url: &str,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(
            caller,
            RegistryCommand::RegisterAuditor {
                name: name.to_string(),
                profile_url: profile_url.to_string(),
            },
            now,
        )
    }

    pub fn update_auditor_profile(
        &mut self,
        caller: &Address,
        name: &str,
        profile_url: &str,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(
            caller,
            RegistryCommand::UpdateAuditorProfile {
                name: name.to_string(),
                profile_url: profile_url.to_string(),
            },
            now,
        )
    }

    pub fn verify_auditor(
        &mut self,
        caller: &Address,
        auditor: &Address,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(
            caller,
            RegistryCommand::VerifyAuditor {
                auditor: auditor.clone(),
            },
            now,
        )
    }

    pub fn revoke_auditor(
        &mut self,
        caller: &Address,
        auditor: &Address,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(
            caller,
            RegistryCommand::RevokeAuditor {
                auditor: auditor.clone(),
            },
            now,
        )
    }

    /// Returns the new report id
    pub fn submit_audit(
        &mut self,
        caller: &Address,
        submission: AuditSubmission,
        now: DateTime<Utc>,
    ) -> Result<u64, RegistryError> {
        let report_id = self.ledger.next_report_id();
        self.apply(caller, RegistryCommand::SubmitAudit(submission), now)?;
        Ok(report_id)
    }

    /// Returns the index of the new finding within its report
    pub fn add_finding(
        &mut self,
        caller: &Address,
        report_id: u64,
        finding: NewFinding,
        now: DateTime<Utc>,
    ) -> Result<u64, RegistryError> {
        let outcome = self.apply(caller, RegistryCommand::AddFinding { report_id, finding }, now)?;
        outcome
            .finding_index
            .ok_or(RegistryError::NotFound(RecordRef::Report(report_id)))
    }

    pub fn acknowledge_finding(
        &mut self,
        caller: &Address,
        report_id: u64,
        index: u64,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(caller, RegistryCommand::AcknowledgeFinding { report_id, index }, now)
    }

    pub fn resolve_finding(
        &mut self,
        caller: &Address,
        report_id: u64,
        index: u64,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(caller, RegistryCommand::ResolveFinding { report_id, index }, now)
    }

    pub fn verify_audit(
        &mut self,
        caller: &Address,
        report_id: u64,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(caller, RegistryCommand::VerifyAudit { report_id }, now)
    }

    pub fn dispute_audit(
        &mut self,
        caller: &Address,
        report_id: u64,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(caller, RegistryCommand::DisputeAudit { report_id }, now)
    }

    pub fn resolve_dispute(
        &mut self,
        caller: &Address,
        report_id: u64,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, RegistryError> {
        self.apply(caller, RegistryCommand::ResolveDispute { report_id }, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::Severity;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn submission(score: u64) -> AuditSubmission {
        AuditSubmission {
            contract_address: addr(100),
            chain_id: 1,
            report_hash: "bafybeigdyrzt".to_string(),
            security_score: score,
            project_owner: addr(3),
        }
    }

    fn critical() -> NewFinding {
        NewFinding {
            severity: Severity::Critical.ordinal(),
            title: "Unchecked delegatecall".to_string(),
            description: "bafkreia".to_string(),
        }
    }

    #[test]
    fn test_apply_emits_events_and_journal_entries() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();

        let outcome = vault.register_auditor(&addr(2), "Acme", "https://acme.example", now).unwrap();
        assert_eq!(outcome.sequence, 0);
        assert_eq!(
            outcome.events,
            vec![RegistryEvent::AuditorRegistered {
                auditor: addr(2),
                name: "Acme".to_string()
            }]
        );

        let outcome = vault
            .apply(&addr(2), RegistryCommand::SubmitAudit(submission(90)), now)
            .unwrap();
        assert_eq!(outcome.sequence, 1);
        assert_eq!(outcome.report_id, Some(0));
        assert!(matches!(
            outcome.events[0],
            RegistryEvent::AuditSubmitted { report_id: 0, security_score: 90, .. }
        ));

        assert_eq!(vault.add_finding(&addr(2), 0, critical(), now).unwrap(), 0);
        assert_eq!(vault.journal().len(), 3);
    }

    #[test]
    fn test_rejected_commands_leave_no_trace() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();

        assert!(vault.submit_audit(&addr(2), submission(101), now).is_err());
        assert!(vault.verify_auditor(&addr(2), &addr(2), now).is_err());
        assert!(vault.register_auditor(&addr(2), "Again", "", now).is_err());

        assert_eq!(vault.journal().len(), 1);
        assert_eq!(vault.ledger().next_report_id(), 0);
        assert!(!vault.auditors().is_verified(&addr(2)));
    }

    #[test]
    fn test_preflight_matches_apply() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();

        let command = RegistryCommand::SubmitAudit(submission(50));
        assert_eq!(
            vault.preflight(&addr(2), &command),
            Err(RegistryError::NotRegistered(addr(2)))
        );

        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();
        assert!(vault.preflight(&addr(2), &command).is_ok());
        assert!(vault.apply(&addr(2), command, now).is_ok());
    }

    #[test]
    fn test_stage_then_commit() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();

        let entry = vault
            .stage(
                &addr(2),
                RegistryCommand::RegisterAuditor {
                    name: "Acme".to_string(),
                    profile_url: String::new(),
                },
                now,
            )
            .unwrap();
        assert!(vault.journal().is_empty());

        let outcome = vault.commit(entry.clone()).unwrap();
        assert_eq!(outcome.sequence, 0);
        assert!(vault.auditors().is_registered(&addr(2)));

        // The same entry cannot be committed twice
        assert!(matches!(
            vault.commit(entry),
            Err(JournalError::SequenceGap { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn test_replay_rebuilds_identical_state() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();
        vault.verify_auditor(&addr(1), &addr(2), now).unwrap();
        let id = vault.submit_audit(&addr(2), submission(77), now).unwrap();
        vault.add_finding(&addr(2), id, critical(), now).unwrap();
        vault.resolve_finding(&addr(3), id, 0, now).unwrap();
        vault.dispute_audit(&addr(3), id, now).unwrap();
        vault.resolve_dispute(&addr(1), id, now).unwrap();

        let entries = vault.journal().entries().to_vec();
        let replayed = AuditVault::replay(addr(1), ScoringPolicy::default(), entries).unwrap();

        assert_eq!(replayed.journal().head_digest(), vault.journal().head_digest());
        assert_eq!(replayed.ledger().report(id), vault.ledger().report(id));
        assert_eq!(replayed.auditors().get(&addr(2)), vault.auditors().get(&addr(2)));
        assert_eq!(replayed.ledger().total_findings(), 1);
    }

    #[test]
    fn test_replay_rejects_entry_from_wrong_administrator() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();
        vault.verify_auditor(&addr(1), &addr(2), now).unwrap();

        let entries = vault.journal().entries().to_vec();
        let err = AuditVault::replay(addr(9), ScoringPolicy::default(), entries)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            JournalError::Rejected {
                sequence: 1,
                source: RegistryError::Unauthorized { .. }
            }
        ));
    }

    #[test]
    fn test_revoke_lowers_reputation() {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();
        vault.verify_auditor(&addr(1), &addr(2), now).unwrap();
        let verified = vault.auditors().get(&addr(2)).unwrap().reputation_score;

        vault.revoke_auditor(&addr(1), &addr(2), now).unwrap();
        let profile = vault.auditors().get(&addr(2)).unwrap();
        assert!(!profile.verified);
        assert!(profile.reputation_score < verified);

        assert!(matches!(
            vault.revoke_auditor(&addr(2), &addr(2), now),
            Err(RegistryError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_catch_up_commits_only_unseen_entries() {
        let mut leader = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        leader.register_auditor(&addr(2), "Acme", "", now).unwrap();
        let id = leader.submit_audit(&addr(2), submission(64), now).unwrap();

        let mut follower =
            AuditVault::replay(addr(1), ScoringPolicy::default(), leader.journal().entries().to_vec())
                .unwrap();

        leader.add_finding(&addr(2), id, critical(), now).unwrap();
        leader.verify_audit(&addr(3), id, now).unwrap();

        let outcomes = follower.catch_up(leader.journal().entries().to_vec()).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].finding_index, Some(0));
        assert_eq!(follower.journal().head_digest(), leader.journal().head_digest());
        assert_eq!(follower.ledger().report(id), leader.ledger().report(id));

        // Already caught up
        assert!(follower.catch_up(leader.journal().entries().to_vec()).unwrap().is_empty());

        // A tail that skips a sequence is refused
        let mut lagging = AuditVault::new(addr(1), ScoringPolicy::default());
        let tail = leader.journal().entries()[1..].to_vec();
        assert!(matches!(
            lagging.catch_up(tail),
            Err(JournalError::SequenceGap { expected: 0, found: 1 })
        ));
    }
}
