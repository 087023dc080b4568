//! Registry Commands
//!
//! Every state-mutating operation as a serializable value, so the same
//! transition can be applied live, written ahead to storage, and replayed.

use serde::{Deserialize, Serialize};

use crate::registry::ledger::{AuditSubmission, NewFinding};
use crate::registry::types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RegistryCommand {
    RegisterAuditor {
        name: String,
        profile_url: String,
    },
    UpdateAuditorProfile {
        name: String,
        profile_url: String,
    },
    VerifyAuditor {
        auditor: Address,
    },
    RevokeAuditor {
        auditor: Address,
    },
    SubmitAudit(AuditSubmission),
    AddFinding {
        report_id: u64,
        finding: NewFinding,
    },
    AcknowledgeFinding {
        report_id: u64,
        index: u64,
    },
    ResolveFinding {
        report_id: u64,
        index: u64,
    },
    VerifyAudit {
        report_id: u64,
    },
    DisputeAudit {
        report_id: u64,
    },
    ResolveDispute {
        report_id: u64,
    },
}

impl RegistryCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryCommand::RegisterAuditor { .. } => "register_auditor",
            RegistryCommand::UpdateAuditorProfile { .. } => "update_auditor_profile",
            RegistryCommand::VerifyAuditor { .. } => "verify_auditor",
            RegistryCommand::RevokeAuditor { .. } => "revoke_auditor",
            RegistryCommand::SubmitAudit(_) => "submit_audit",
            RegistryCommand::AddFinding { .. } => "add_finding",
            RegistryCommand::AcknowledgeFinding { .. } => "acknowledge_finding",
            RegistryCommand::ResolveFinding { .. } => "resolve_finding",
            RegistryCommand::VerifyAudit { .. } => "verify_audit",
            RegistryCommand::DisputeAudit { .. } => "dispute_audit",
            RegistryCommand::ResolveDispute { .. } => "resolve_dispute",
        }
    }

    /// Report targeted by the command, if any
    pub fn report_id(&self) -> Option<u64> {
        match self {
            RegistryCommand::AddFinding { report_id, .. }
            | RegistryCommand::AcknowledgeFinding { report_id, .. }
            | RegistryCommand::ResolveFinding { report_id, .. }
            | RegistryCommand::VerifyAudit { report_id }
            | RegistryCommand::DisputeAudit { report_id }
            | RegistryCommand::ResolveDispute { report_id } => Some(*report_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_is_tagged() {
        let command = RegistryCommand::SubmitAudit(AuditSubmission {
            contract_address: Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            chain_id: 8453,
            report_hash: "bafybeih".to_string(),
            security_score: 88,
            project_owner: Address::parse("0x00000000000000000000000000000000000000bb").unwrap(),
        });

        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["command"], "submit_audit");
        assert_eq!(json["chain_id"], 8453);

        let back: RegistryCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
        assert_eq!(back.name(), "submit_audit");
        assert_eq!(back.report_id(), None);
    }

    #[test]
    fn test_report_id_extraction() {
        let command = RegistryCommand::ResolveFinding {
            report_id: 7,
            index: 2,
        };
        assert_eq!(command.report_id(), Some(7));
    }
}
