//! Report Ledger
//!
//! Owns audit reports and their findings, the per-contract and per-auditor
//! indexes, and the registry-wide counters. Every operation is split into a
//! read-only `check_*` step and the mutation that follows it; the mutation
//! only runs once every precondition has passed, so a rejected command never
//! leaves partial state behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::registry::auditors::AuditorRegistry;
use crate::registry::error::{RecordRef, RegistryError};
use crate::registry::roles::RoleResolver;
use crate::registry::scoring::{security_score, SecurityScore, MAX_SECURITY_SCORE};
use crate::registry::types::{Address, AuditReport, Finding, ReportStatus, Severity};

/// Input of `submit_audit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSubmission {
    pub contract_address: Address,
    pub chain_id: u64,
    pub report_hash: String,
    /// Validated against 0..=100 on submission
    pub security_score: u64,
    pub project_owner: Address,
}

/// Input of `add_finding`; severity is the raw ordinal and validated on use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFinding {
    pub severity: u8,
    pub title: String,
    pub description: String,
}

#[derive(Default)]
pub struct ReportLedger {
    /// Indexed by report id; ids are dense and start at 0
    reports: Vec<AuditReport>,
    by_contract: HashMap<Address, Vec<u64>>,
    by_auditor: HashMap<Address, Vec<u64>>,
    total_audits: u64,
    total_findings: u64,
}

impl ReportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, report_id: u64) -> Option<&AuditReport> {
        usize::try_from(report_id)
            .ok()
            .and_then(|index| self.reports.get(index))
    }

    fn report_mut(&mut self, report_id: u64) -> Result<&mut AuditReport, RegistryError> {
        usize::try_from(report_id)
            .ok()
            .and_then(move |index| self.reports.get_mut(index))
            .ok_or(RegistryError::NotFound(RecordRef::Report(report_id)))
    }

    pub fn require_report(&self, report_id: u64) -> Result<&AuditReport, RegistryError> {
        self.report(report_id)
            .ok_or(RegistryError::NotFound(RecordRef::Report(report_id)))
    }

    pub fn finding(&self, report_id: u64, index: u64) -> Result<&Finding, RegistryError> {
        self.require_report(report_id)?
            .finding(index)
            .ok_or(RegistryError::NotFound(RecordRef::Finding { report_id, index }))
    }

    pub fn contract_report_ids(&self, contract: &Address) -> &[u64] {
        self.by_contract
            .get(contract)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn auditor_report_ids(&self, auditor: &Address) -> &[u64] {
        self.by_auditor
            .get(auditor)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn security_score(&self, contract: &Address) -> SecurityScore {
        security_score(
            self.contract_report_ids(contract)
                .iter()
                .filter_map(|id| self.report(*id))
                .map(|report| report.security_score),
        )
    }

    pub fn total_audits(&self) -> u64 {
        self.total_audits
    }

    pub fn total_findings(&self) -> u64 {
        self.total_findings
    }

    pub fn next_report_id(&self) -> u64 {
        self.reports.len() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditReport> {
        self.reports.iter()
    }

    // ── Submission ──

    /// Validate a submission; returns the score narrowed to its stored width
    pub fn check_submit(
        &self,
        roles: &RoleResolver,
        auditors: &AuditorRegistry,
        caller: &Address,
        submission: &AuditSubmission,
    ) -> Result<u8, RegistryError> {
        roles.require_registered(caller, auditors)?;

        if submission.security_score > u64::from(MAX_SECURITY_SCORE) {
            return Err(RegistryError::InvalidScore(submission.security_score));
        }
        Ok(submission.security_score as u8)
    }

    /// Store a new report as `Submitted` and credit the auditor
    pub fn submit(
        &mut self,
        roles: &RoleResolver,
        auditors: &mut AuditorRegistry,
        caller: &Address,
        submission: AuditSubmission,
        now: DateTime<Utc>,
    ) -> Result<u64, RegistryError> {
        let security_score = self.check_submit(roles, auditors, caller, &submission)?;

        let report_id = self.next_report_id();
        let report = AuditReport {
            id: report_id,
            contract_address: submission.contract_address.clone(),
            chain_id: submission.chain_id,
            auditor: caller.clone(),
            timestamp: now,
            report_hash: submission.report_hash,
            security_score,
            status: ReportStatus::Submitted,
            finding_count: 0,
            project_owner: submission.project_owner,
            project_verified: false,
            findings: Vec::new(),
        };

        self.reports.push(report);
        self.by_contract
            .entry(submission.contract_address.clone())
            .or_default()
            .push(report_id);
        self.by_auditor
            .entry(caller.clone())
            .or_default()
            .push(report_id);
        self.total_audits += 1;

        auditors.record_audit_submission(caller);

        info!(
            report_id,
            contract = %submission.contract_address,
            auditor = %caller,
            security_score,
            "Audit submitted"
        );

        Ok(report_id)
    }

    // ── Findings ──

    pub fn check_add_finding(
        &self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        severity: u8,
    ) -> Result<Severity, RegistryError> {
        let report = self.require_report(report_id)?;
        roles.require_author(caller, report, "add findings to this report")?;
        Severity::try_from(severity)
    }

    /// Append a finding; returns its index within the report
    pub fn add_finding(
        &mut self,
        roles: &RoleResolver,
        auditors: &mut AuditorRegistry,
        caller: &Address,
        report_id: u64,
        finding: NewFinding,
    ) -> Result<u64, RegistryError> {
        let severity = self.check_add_finding(roles, caller, report_id, finding.severity)?;

        let report = self.report_mut(report_id)?;
        let index = report.finding_count;
        report.findings.push(Finding {
            severity,
            title: finding.title,
            description: finding.description,
            acknowledged: false,
            resolved: false,
        });
        report.finding_count += 1;
        self.total_findings += 1;

        auditors.record_finding(caller, severity);

        info!(report_id, index, severity = %severity, "Finding added");
        Ok(index)
    }

    pub fn check_finding_owner(
        &self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        index: u64,
        action: &'static str,
    ) -> Result<(), RegistryError> {
        let report = self.require_report(report_id)?;
        roles.require_project_owner(caller, report, action)?;
        if report.finding(index).is_none() {
            return Err(RegistryError::NotFound(RecordRef::Finding { report_id, index }));
        }
        Ok(())
    }

    /// Returns whether the flag changed
    pub fn acknowledge_finding(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        index: u64,
    ) -> Result<bool, RegistryError> {
        self.check_finding_owner(roles, caller, report_id, index, "acknowledge findings")?;
        let finding = self.finding_mut(report_id, index)?;
        let changed = !finding.acknowledged;
        finding.acknowledged = true;
        debug!(report_id, index, changed, "Finding acknowledged");
        Ok(changed)
    }

    /// Returns whether the flag changed. Acknowledgement is not required first.
    pub fn resolve_finding(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        index: u64,
    ) -> Result<bool, RegistryError> {
        self.check_finding_owner(roles, caller, report_id, index, "resolve findings")?;
        let finding = self.finding_mut(report_id, index)?;
        let changed = !finding.resolved;
        finding.resolved = true;
        debug!(report_id, index, changed, "Finding resolved");
        Ok(changed)
    }

    fn finding_mut(&mut self, report_id: u64, index: u64) -> Result<&mut Finding, RegistryError> {
        self.report_mut(report_id)?
            .finding_mut(index)
            .ok_or(RegistryError::NotFound(RecordRef::Finding { report_id, index }))
    }

    // ── Lifecycle ──

    /// Check that `caller` may move the report to `target` from its current status.
    ///
    /// `Resolved` is reached by the administrator; every other target by the
    /// report's project owner.
    pub fn check_transition(
        &self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        target: ReportStatus,
    ) -> Result<(), RegistryError> {
        let report = if target == ReportStatus::Resolved {
            roles.require_administrator(caller, "resolve disputes")?;
            self.require_report(report_id)?
        } else {
            let report = self.require_report(report_id)?;
            roles.require_project_owner(caller, report, "change the status of this report")?;
            report
        };

        if !report.status.can_transition_to(target) {
            return Err(RegistryError::InvalidTransition {
                report_id,
                from: report.status,
                to: target,
            });
        }
        Ok(())
    }

    pub fn transition(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
        target: ReportStatus,
    ) -> Result<(), RegistryError> {
        self.check_transition(roles, caller, report_id, target)?;

        let report = self.report_mut(report_id)?;
        let from = report.status;
        report.status = target;
        if target == ReportStatus::Verified {
            report.project_verified = true;
        }

        info!(report_id, from = %from, to = %target, "Report status changed");
        Ok(())
    }

    pub fn verify_audit(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
    ) -> Result<(), RegistryError> {
        self.transition(roles, caller, report_id, ReportStatus::Verified)
    }

    pub fn dispute_audit(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
    ) -> Result<(), RegistryError> {
        self.transition(roles, caller, report_id, ReportStatus::Disputed)
    }

    pub fn resolve_dispute(
        &mut self,
        roles: &RoleResolver,
        caller: &Address,
        report_id: u64,
    ) -> Result<(), RegistryError> {
        self.transition(roles, caller, report_id, ReportStatus::Resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    const ADMIN: u8 = 1;
    const AUDITOR: u8 = 2;
    const OWNER: u8 = 3;
    const CONTRACT: u8 = 100;

    struct Fixture {
        roles: RoleResolver,
        auditors: AuditorRegistry,
        ledger: ReportLedger,
    }

    impl Fixture {
        fn new() -> Self {
            let mut auditors = AuditorRegistry::default();
            auditors
                .register(&addr(AUDITOR), "Acme".to_string(), String::new(), Utc::now())
                .unwrap();
            Self {
                roles: RoleResolver::new(addr(ADMIN)),
                auditors,
                ledger: ReportLedger::new(),
            }
        }

        fn submit(&mut self, score: u64) -> Result<u64, RegistryError> {
            self.ledger.submit(
                &self.roles,
                &mut self.auditors,
                &addr(AUDITOR),
                AuditSubmission {
                    contract_address: addr(CONTRACT),
                    chain_id: 1,
                    report_hash: "bafybeigdyrzt".to_string(),
                    security_score: score,
                    project_owner: addr(OWNER),
                },
                Utc::now(),
            )
        }

        fn add_finding(&mut self, caller: u8, report_id: u64, severity: u8) -> Result<u64, RegistryError> {
            self.ledger.add_finding(
                &self.roles,
                &mut self.auditors,
                &addr(caller),
                report_id,
                NewFinding {
                    severity,
                    title: "Reentrancy".to_string(),
                    description: "withdraw() calls out before updating balance".to_string(),
                },
            )
        }
    }

    #[test]
    fn test_submit_allocates_dense_ids() {
        let mut fx = Fixture::new();
        assert_eq!(fx.ledger.next_report_id(), 0);
        assert_eq!(fx.submit(90).unwrap(), 0);
        assert_eq!(fx.submit(80).unwrap(), 1);
        assert_eq!(fx.ledger.next_report_id(), 2);
        assert_eq!(fx.ledger.total_audits(), 2);
        assert_eq!(fx.ledger.contract_report_ids(&addr(CONTRACT)), &[0, 1]);
        assert_eq!(fx.ledger.auditor_report_ids(&addr(AUDITOR)), &[0, 1]);

        let report = fx.ledger.report(0).unwrap();
        assert_eq!(report.status, ReportStatus::Submitted);
        assert_eq!(report.finding_count, 0);
        assert!(!report.project_verified);
    }

    #[test]
    fn test_submit_requires_registration() {
        let mut fx = Fixture::new();
        let err = fx
            .ledger
            .submit(
                &fx.roles,
                &mut fx.auditors,
                &addr(9),
                AuditSubmission {
                    contract_address: addr(CONTRACT),
                    chain_id: 1,
                    report_hash: String::new(),
                    security_score: 50,
                    project_owner: addr(OWNER),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered(addr(9)));
        assert_eq!(fx.ledger.next_report_id(), 0);
    }

    #[test]
    fn test_score_bounds() {
        let mut fx = Fixture::new();
        assert_eq!(fx.submit(101), Err(RegistryError::InvalidScore(101)));
        assert!(fx.submit(0).is_ok());
        assert!(fx.submit(100).is_ok());
        assert_eq!(fx.ledger.total_audits(), 2);
    }

    #[test]
    fn test_add_finding_checks() {
        let mut fx = Fixture::new();
        let id = fx.submit(70).unwrap();

        assert_eq!(
            fx.add_finding(AUDITOR, 5, 1),
            Err(RegistryError::NotFound(RecordRef::Report(5)))
        );
        assert!(matches!(
            fx.add_finding(OWNER, id, 1),
            Err(RegistryError::Unauthorized { .. })
        ));
        assert_eq!(fx.add_finding(AUDITOR, id, 5), Err(RegistryError::InvalidSeverity(5)));
        assert_eq!(fx.ledger.report(id).unwrap().finding_count, 0);
        assert_eq!(fx.ledger.total_findings(), 0);

        assert_eq!(fx.add_finding(AUDITOR, id, 4).unwrap(), 0);
        assert_eq!(fx.add_finding(AUDITOR, id, 2).unwrap(), 1);
        assert_eq!(fx.ledger.report(id).unwrap().finding_count, 2);
        assert_eq!(fx.ledger.total_findings(), 2);

        let profile = fx.auditors.get(&addr(AUDITOR)).unwrap();
        assert_eq!(profile.findings_total, 2);
        assert_eq!(profile.critical_findings, 1);
    }

    #[test]
    fn test_finding_flags_are_independent_and_sticky() {
        let mut fx = Fixture::new();
        let id = fx.submit(70).unwrap();
        fx.add_finding(AUDITOR, id, 3).unwrap();

        // Resolution without acknowledgement is allowed
        assert!(fx.ledger.resolve_finding(&fx.roles, &addr(OWNER), id, 0).unwrap());
        assert!(!fx.ledger.resolve_finding(&fx.roles, &addr(OWNER), id, 0).unwrap());

        let finding = fx.ledger.finding(id, 0).unwrap();
        assert!(finding.resolved);
        assert!(!finding.acknowledged);

        assert!(fx.ledger.acknowledge_finding(&fx.roles, &addr(OWNER), id, 0).unwrap());
        assert!(fx.ledger.finding(id, 0).unwrap().acknowledged);
    }

    #[test]
    fn test_finding_flags_require_owner_and_existing_index() {
        let mut fx = Fixture::new();
        let id = fx.submit(70).unwrap();
        fx.add_finding(AUDITOR, id, 0).unwrap();

        assert!(matches!(
            fx.ledger.acknowledge_finding(&fx.roles, &addr(AUDITOR), id, 0),
            Err(RegistryError::Unauthorized { .. })
        ));
        assert_eq!(
            fx.ledger.resolve_finding(&fx.roles, &addr(OWNER), id, 1),
            Err(RegistryError::NotFound(RecordRef::Finding { report_id: id, index: 1 }))
        );
        assert!(!fx.ledger.finding(id, 0).unwrap().acknowledged);
    }

    #[test]
    fn test_verify_path() {
        let mut fx = Fixture::new();
        let id = fx.submit(95).unwrap();

        assert!(matches!(
            fx.ledger.verify_audit(&fx.roles, &addr(AUDITOR), id),
            Err(RegistryError::Unauthorized { .. })
        ));

        fx.ledger.verify_audit(&fx.roles, &addr(OWNER), id).unwrap();
        let report = fx.ledger.report(id).unwrap();
        assert_eq!(report.status, ReportStatus::Verified);
        assert!(report.project_verified);

        assert_eq!(
            fx.ledger.dispute_audit(&fx.roles, &addr(OWNER), id),
            Err(RegistryError::InvalidTransition {
                report_id: id,
                from: ReportStatus::Verified,
                to: ReportStatus::Disputed
            })
        );
    }

    #[test]
    fn test_dispute_path() {
        let mut fx = Fixture::new();
        let id = fx.submit(40).unwrap();

        // Nothing to resolve yet
        assert!(matches!(
            fx.ledger.resolve_dispute(&fx.roles, &addr(ADMIN), id),
            Err(RegistryError::InvalidTransition { .. })
        ));

        fx.ledger.dispute_audit(&fx.roles, &addr(OWNER), id).unwrap();
        assert!(matches!(
            fx.ledger.resolve_dispute(&fx.roles, &addr(OWNER), id),
            Err(RegistryError::Unauthorized { .. })
        ));
        assert!(matches!(
            fx.ledger.verify_audit(&fx.roles, &addr(OWNER), id),
            Err(RegistryError::InvalidTransition { .. })
        ));

        fx.ledger.resolve_dispute(&fx.roles, &addr(ADMIN), id).unwrap();
        let report = fx.ledger.report(id).unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
        assert!(!report.project_verified);
    }

    #[test]
    fn test_security_score_aggregation() {
        let mut fx = Fixture::new();
        assert_eq!(fx.ledger.security_score(&addr(CONTRACT)), SecurityScore::default());

        fx.submit(90).unwrap();
        fx.submit(75).unwrap();
        let score = fx.ledger.security_score(&addr(CONTRACT));
        assert_eq!(score.average, 82);
        assert_eq!(score.audit_count, 2);
        assert!(score.is_audited());

        assert!(!fx.ledger.security_score(&addr(101)).is_audited());
    }
}
