//! Registry Record Types
//!
//! Auditor profiles, audit reports and findings, plus the address, severity
//! and lifecycle status types they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::registry::error::{AddressError, RegistryError};

/// Number of hex digits in a 20-byte address
const ADDRESS_HEX_LEN: usize = 40;

/// A 20-byte principal or contract address, `0x`-prefixed and lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;

        if digits.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength(digits.len()));
        }
        hex::decode(digits).map_err(|_| AddressError::InvalidHex)?;

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (`0x1234…abcd`)
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Finding severity, ordered from least to most severe (ordinal 0-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = RegistryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::ALL
            .get(value as usize)
            .copied()
            .ok_or(RegistryError::InvalidSeverity(value))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of an audit report
///
/// ```text
/// Submitted ──► Verified            (project owner)
///     │
///     └──────► Disputed ──► Resolved (administrator)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    Submitted,
    Verified,
    Disputed,
    Resolved,
}

impl ReportStatus {
    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Submitted, ReportStatus::Verified)
                | (ReportStatus::Submitted, ReportStatus::Disputed)
                | (ReportStatus::Disputed, ReportStatus::Resolved)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Verified | ReportStatus::Resolved)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportStatus::Submitted => "Submitted",
            ReportStatus::Verified => "Verified",
            ReportStatus::Disputed => "Disputed",
            ReportStatus::Resolved => "Resolved",
        };
        f.write_str(label)
    }
}

/// Registered auditor and its accumulated statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorProfile {
    pub address: Address,
    pub name: String,
    pub profile_url: String,

    /// Statistics, written only by the report ledger
    pub audits_completed: u64,
    pub findings_total: u64,
    pub critical_findings: u64,

    pub registered_at: DateTime<Utc>,

    /// Set by the registry administrator
    pub verified: bool,

    /// Basis points (0-10000), recomputed after every statistic change
    pub reputation_score: u32,
}

/// One audit submission for a contract on a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub id: u64,
    pub contract_address: Address,
    pub chain_id: u64,
    pub auditor: Address,
    pub timestamp: DateTime<Utc>,

    /// Content identifier of the off-chain report body
    pub report_hash: String,

    /// 0-100, fixed at submission
    pub security_score: u8,

    pub status: ReportStatus,
    pub finding_count: u64,
    pub project_owner: Address,
    pub project_verified: bool,

    #[serde(skip)]
    pub(crate) findings: Vec<Finding>,
}

impl AuditReport {
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn finding(&self, index: u64) -> Option<&Finding> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.findings.get(index))
    }

    pub(crate) fn finding_mut(&mut self, index: u64) -> Option<&mut Finding> {
        usize::try_from(index)
            .ok()
            .and_then(move |index| self.findings.get_mut(index))
    }
}

/// One issue recorded within a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,

    /// Free text or a content identifier for longer detail
    pub description: String,

    pub acknowledged: bool,
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalization() {
        let address = Address::parse("0x5E1024891C900c757Eb3a60f11A1A6Dcb8341C7F").unwrap();
        assert_eq!(address.as_str(), "0x5e1024891c900c757eb3a60f11a1a6dcb8341c7f");
        assert_eq!(address.short(), "0x5e10…1c7f");
    }

    #[test]
    fn test_address_rejects_malformed_input() {
        assert_eq!(
            Address::parse("5e1024891c900c757eb3a60f11a1a6dcb8341c7f"),
            Err(AddressError::MissingPrefix)
        );
        assert_eq!(Address::parse("0x1234"), Err(AddressError::InvalidLength(4)));
        assert_eq!(
            Address::parse("0xzz1024891c900c757eb3a60f11a1a6dcb8341c7f"),
            Err(AddressError::InvalidHex)
        );
    }

    #[test]
    fn test_address_serde_validates() {
        let json = "\"0xAB00000000000000000000000000000000000001\"";
        let address: Address = serde_json::from_str(json).unwrap();
        assert_eq!(address.as_str(), "0xab00000000000000000000000000000000000001");

        assert!(serde_json::from_str::<Address>("\"0xnope\"").is_err());
    }

    #[test]
    fn test_severity_from_ordinal() {
        assert_eq!(Severity::try_from(0), Ok(Severity::Info));
        assert_eq!(Severity::try_from(4), Ok(Severity::Critical));
        assert_eq!(Severity::try_from(5), Err(RegistryError::InvalidSeverity(5)));
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_status_transitions() {
        use ReportStatus::*;

        assert!(Submitted.can_transition_to(Verified));
        assert!(Submitted.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Resolved));

        assert!(!Submitted.can_transition_to(Resolved));
        assert!(!Verified.can_transition_to(Disputed));
        assert!(!Resolved.can_transition_to(Disputed));
        assert!(!Disputed.can_transition_to(Verified));

        assert!(Verified.is_terminal());
        assert!(Resolved.is_terminal());
        assert!(!Disputed.is_terminal());
    }
}
