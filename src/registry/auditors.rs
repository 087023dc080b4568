//! Auditor Registry
//!
//! Owns auditor profiles. Registration is self-service, verification is an
//! administrator action, and statistics are written only by the report ledger
//! through the crate-internal `record_*` hooks.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::registry::error::RegistryError;
use crate::registry::scoring::{reputation_score, AuditorStats, ScoringPolicy};
use crate::registry::types::{Address, AuditorProfile, Severity};

pub struct AuditorRegistry {
    profiles: HashMap<Address, AuditorProfile>,
    policy: ScoringPolicy,
}

impl AuditorRegistry {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            profiles: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn get(&self, address: &Address) -> Option<&AuditorProfile> {
        self.profiles.get(address)
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.profiles.contains_key(address)
    }

    pub fn is_verified(&self, address: &Address) -> bool {
        self.profiles
            .get(address)
            .map(|profile| profile.verified)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditorProfile> {
        self.profiles.values()
    }

    pub fn check_register(&self, caller: &Address) -> Result<(), RegistryError> {
        if self.is_registered(caller) {
            return Err(RegistryError::AlreadyRegistered(caller.clone()));
        }
        Ok(())
    }

    pub fn check_exists(&self, address: &Address) -> Result<(), RegistryError> {
        if !self.is_registered(address) {
            return Err(RegistryError::NotRegistered(address.clone()));
        }
        Ok(())
    }

    /// Register `caller` as a new, unverified auditor
    pub fn register(
        &mut self,
        caller: &Address,
        name: String,
        profile_url: String,
        now: DateTime<Utc>,
    ) -> Result<&AuditorProfile, RegistryError> {
        self.check_register(caller)?;

        info!(auditor = %caller, name = %name, "Auditor registered");

        let profile = AuditorProfile {
            address: caller.clone(),
            name,
            profile_url,
            audits_completed: 0,
            findings_total: 0,
            critical_findings: 0,
            registered_at: now,
            verified: false,
            reputation_score: 0,
        };

        Ok(self.profiles.entry(caller.clone()).or_insert(profile))
    }

    /// Change the name and URL of the caller's own profile
    pub fn update_profile(
        &mut self,
        caller: &Address,
        name: String,
        profile_url: String,
    ) -> Result<(), RegistryError> {
        let profile = self
            .profiles
            .get_mut(caller)
            .ok_or_else(|| RegistryError::NotRegistered(caller.clone()))?;

        profile.name = name;
        profile.profile_url = profile_url;
        debug!(auditor = %caller, "Auditor profile updated");
        Ok(())
    }

    /// Set the verification flag. Repeating the current value is a no-op.
    ///
    /// Callers must have already checked the administrator role.
    pub fn set_verified(&mut self, auditor: &Address, verified: bool) -> Result<(), RegistryError> {
        let policy = self.policy;
        let profile = self
            .profiles
            .get_mut(auditor)
            .ok_or_else(|| RegistryError::NotRegistered(auditor.clone()))?;

        if profile.verified == verified {
            debug!(auditor = %auditor, verified, "Verification unchanged");
            return Ok(());
        }

        profile.verified = verified;
        Self::recompute(profile, &policy);

        info!(
            auditor = %auditor,
            verified,
            reputation = profile.reputation_score,
            "Auditor verification changed"
        );
        Ok(())
    }

    pub(crate) fn record_audit_submission(&mut self, auditor: &Address) {
        let policy = self.policy;
        if let Some(profile) = self.profiles.get_mut(auditor) {
            profile.audits_completed += 1;
            Self::recompute(profile, &policy);
        }
    }

    pub(crate) fn record_finding(&mut self, auditor: &Address, severity: Severity) {
        let policy = self.policy;
        if let Some(profile) = self.profiles.get_mut(auditor) {
            profile.findings_total += 1;
            if severity == Severity::Critical {
                profile.critical_findings += 1;
            }
            Self::recompute(profile, &policy);
        }
    }

    fn recompute(profile: &mut AuditorProfile, policy: &ScoringPolicy) {
        let stats = AuditorStats {
            audits_completed: profile.audits_completed,
            findings_total: profile.findings_total,
            critical_findings: profile.critical_findings,
            verified: profile.verified,
        };
        profile.reputation_score = reputation_score(&stats, policy);
    }
}

impl Default for AuditorRegistry {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}
