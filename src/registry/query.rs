//! Read-only view over a committed vault

use serde::Serialize;

use crate::registry::error::RegistryError;
use crate::registry::journal::JournalEntry;
use crate::registry::scoring::SecurityScore;
use crate::registry::types::{Address, AuditReport, AuditorProfile, Finding};
use crate::registry::vault::AuditVault;

/// Registry-wide summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub administrator: Address,
    pub registered_auditors: usize,
    pub verified_auditors: usize,
    pub total_audits: u64,
    pub total_findings: u64,
    pub next_report_id: u64,
    pub journal_length: u64,
    pub journal_head: String,
}

pub struct QueryFacade<'a> {
    vault: &'a AuditVault,
}

impl<'a> QueryFacade<'a> {
    pub fn new(vault: &'a AuditVault) -> Self {
        Self { vault }
    }

    pub fn get_report(&self, report_id: u64) -> Result<&'a AuditReport, RegistryError> {
        self.vault.ledger().require_report(report_id)
    }

    pub fn get_finding(&self, report_id: u64, index: u64) -> Result<&'a Finding, RegistryError> {
        self.vault.ledger().finding(report_id, index)
    }

    /// Findings of one report, in insertion order
    pub fn get_findings(&self, report_id: u64) -> Result<&'a [Finding], RegistryError> {
        Ok(self.get_report(report_id)?.findings())
    }

    /// Report ids for a contract in submission order; empty if never audited
    pub fn get_contract_audit_ids(&self, contract: &Address) -> &'a [u64] {
        self.vault.ledger().contract_report_ids(contract)
    }

    pub fn get_contract_audit_count(&self, contract: &Address) -> u64 {
        self.get_contract_audit_ids(contract).len() as u64
    }

    pub fn get_auditor_report_ids(&self, auditor: &Address) -> &'a [u64] {
        self.vault.ledger().auditor_report_ids(auditor)
    }

    pub fn get_security_score(&self, contract: &Address) -> SecurityScore {
        self.vault.ledger().security_score(contract)
    }

    pub fn is_audited(&self, contract: &Address) -> bool {
        !self.get_contract_audit_ids(contract).is_empty()
    }

    pub fn auditor(&self, address: &Address) -> Option<&'a AuditorProfile> {
        self.vault.auditors().get(address)
    }

    pub fn require_auditor(&self, address: &Address) -> Result<&'a AuditorProfile, RegistryError> {
        self.auditor(address)
            .ok_or_else(|| RegistryError::NotRegistered(address.clone()))
    }

    pub fn total_audits(&self) -> u64 {
        self.vault.ledger().total_audits()
    }

    pub fn total_findings(&self) -> u64 {
        self.vault.ledger().total_findings()
    }

    pub fn next_report_id(&self) -> u64 {
        self.vault.ledger().next_report_id()
    }

    pub fn administrator(&self) -> &'a Address {
        self.vault.administrator()
    }

    pub fn stats(&self) -> RegistryStats {
        let auditors = self.vault.auditors();
        let journal = self.vault.journal();

        RegistryStats {
            administrator: self.administrator().clone(),
            registered_auditors: auditors.len(),
            verified_auditors: auditors.iter().filter(|profile| profile.verified).count(),
            total_audits: self.total_audits(),
            total_findings: self.total_findings(),
            next_report_id: self.next_report_id(),
            journal_length: journal.next_sequence(),
            journal_head: journal.head_digest().to_string(),
        }
    }

    pub fn recent_journal(&self, limit: usize) -> Vec<JournalEntry> {
        self.vault.journal().recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ledger::AuditSubmission;
    use crate::registry::scoring::ScoringPolicy;
    use chrono::Utc;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn seeded() -> AuditVault {
        let mut vault = AuditVault::new(addr(1), ScoringPolicy::default());
        let now = Utc::now();
        vault.register_auditor(&addr(2), "Acme", "", now).unwrap();
        for score in [90, 71] {
            vault
                .submit_audit(
                    &addr(2),
                    AuditSubmission {
                        contract_address: addr(100),
                        chain_id: 1,
                        report_hash: "bafy".to_string(),
                        security_score: score,
                        project_owner: addr(3),
                    },
                    now,
                )
                .unwrap();
        }
        vault
    }

    #[test]
    fn test_contract_queries() {
        let vault = seeded();
        let query = vault.query();

        assert_eq!(query.get_contract_audit_ids(&addr(100)), &[0, 1]);
        assert_eq!(query.get_contract_audit_count(&addr(100)), 2);
        assert!(query.is_audited(&addr(100)));

        let score = query.get_security_score(&addr(100));
        assert_eq!((score.average, score.audit_count), (80, 2));

        assert!(!query.is_audited(&addr(101)));
        assert_eq!(query.get_contract_audit_count(&addr(101)), 0);
        let unaudited = query.get_security_score(&addr(101));
        assert_eq!((unaudited.average, unaudited.audit_count), (0, 0));
    }

    #[test]
    fn test_missing_records() {
        let vault = seeded();
        let query = vault.query();

        assert!(matches!(query.get_report(9), Err(RegistryError::NotFound(_))));
        assert!(matches!(query.get_finding(0, 0), Err(RegistryError::NotFound(_))));
        assert!(query.auditor(&addr(7)).is_none());
        assert_eq!(
            query.require_auditor(&addr(7)),
            Err(RegistryError::NotRegistered(addr(7)))
        );
    }

    #[test]
    fn test_stats() {
        let vault = seeded();
        let stats = vault.query().stats();

        assert_eq!(stats.administrator, addr(1));
        assert_eq!(stats.registered_auditors, 1);
        assert_eq!(stats.verified_auditors, 0);
        assert_eq!(stats.total_audits, 2);
        assert_eq!(stats.next_report_id, 2);
        assert_eq!(stats.journal_length, 3);
        assert_eq!(stats.journal_head, vault.journal().head_digest());

        let recent = vault.query().recent_journal(1);
        assert_eq!(recent[0].command.name(), "submit_audit");
    }
}
