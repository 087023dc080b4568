//! Identity/Role Resolver
//!
//! Maps a caller identity to the roles it holds, given the auditor registry and
//! (optionally) the report a command targets. Pure lookup, no mutation.

use serde::{Deserialize, Serialize};

use crate::registry::auditors::AuditorRegistry;
use crate::registry::error::RegistryError;
use crate::registry::types::{Address, AuditReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The single registry owner
    Administrator,
    RegisteredAuditor,
    VerifiedAuditor,
    /// Auditor that submitted the targeted report
    ReportAuthor,
    /// Project owner named on the targeted report
    ProjectOwner,
}

/// Roles held by one caller, relative to one (optional) report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub administrator: bool,
    pub registered_auditor: bool,
    pub verified_auditor: bool,
    pub report_author: bool,
    pub project_owner: bool,
}

impl Capabilities {
    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Administrator => self.administrator,
            Role::RegisteredAuditor => self.registered_auditor,
            Role::VerifiedAuditor => self.verified_auditor,
            Role::ReportAuthor => self.report_author,
            Role::ProjectOwner => self.project_owner,
        }
    }

    pub fn roles(&self) -> Vec<Role> {
        [
            Role::Administrator,
            Role::RegisteredAuditor,
            Role::VerifiedAuditor,
            Role::ReportAuthor,
            Role::ProjectOwner,
        ]
        .into_iter()
        .filter(|role| self.has(*role))
        .collect()
    }
}

pub struct RoleResolver {
    administrator: Address,
}

impl RoleResolver {
    pub fn new(administrator: Address) -> Self {
        Self { administrator }
    }

    pub fn administrator(&self) -> &Address {
        &self.administrator
    }

    pub fn resolve(
        &self,
        caller: &Address,
        auditors: &AuditorRegistry,
        report: Option<&AuditReport>,
    ) -> Capabilities {
        Capabilities {
            administrator: *caller == self.administrator,
            registered_auditor: auditors.is_registered(caller),
            verified_auditor: auditors.is_verified(caller),
            report_author: report.map(|r| r.auditor == *caller).unwrap_or(false),
            project_owner: report.map(|r| r.project_owner == *caller).unwrap_or(false),
        }
    }

    pub fn require_administrator(
        &self,
        caller: &Address,
        action: &'static str,
    ) -> Result<(), RegistryError> {
        if *caller != self.administrator {
            return Err(unauthorized(caller, action));
        }
        Ok(())
    }

    pub fn require_registered(
        &self,
        caller: &Address,
        auditors: &AuditorRegistry,
    ) -> Result<(), RegistryError> {
        auditors.check_exists(caller)
    }

    pub fn require_author(
        &self,
        caller: &Address,
        report: &AuditReport,
        action: &'static str,
    ) -> Result<(), RegistryError> {
        if report.auditor != *caller {
            return Err(unauthorized(caller, action));
        }
        Ok(())
    }

    pub fn require_project_owner(
        &self,
        caller: &Address,
        report: &AuditReport,
        action: &'static str,
    ) -> Result<(), RegistryError> {
        if report.project_owner != *caller {
            return Err(unauthorized(caller, action));
        }
        Ok(())
    }
}

fn unauthorized(caller: &Address, action: &'static str) -> RegistryError {
    RegistryError::Unauthorized {
        caller: caller.clone(),
        action,
    }
}
