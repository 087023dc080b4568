//! Scoring Engine
//!
//! Stateless derivations over recorded facts:
//!
//! - **Reputation** (per auditor, basis points 0-10000) from audits completed,
//!   findings recorded, critical findings and verification status.
//! - **Security score** (per contract) as the truncated mean of the scores of
//!   every report filed against the contract.
//!
//! Both are recomputed from scratch on every change; nothing is accumulated
//! incrementally, so there is no rounding drift.

use serde::{Deserialize, Serialize};

/// Upper bound of the reputation scale (100.00%)
pub const MAX_REPUTATION: u32 = 10_000;

/// Upper bound of a report's security score
pub const MAX_SECURITY_SCORE: u8 = 100;

/// Weights of the reputation function
///
/// `critical_penalty` must not exceed `finding_weight`: a critical finding also
/// counts as a finding, so the penalty can slow growth but never reverse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Points per completed audit
    pub audit_weight: u32,

    /// Points per recorded finding
    pub finding_weight: u32,

    /// Flat bonus once the administrator verifies the auditor
    pub verified_bonus: u32,

    /// Critical findings per audit that carry no penalty
    pub critical_allowance_per_audit: u32,

    /// Points deducted per critical finding above the allowance
    pub critical_penalty: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            audit_weight: 250,
            finding_weight: 20,
            verified_bonus: 2_000,
            critical_allowance_per_audit: 3,
            critical_penalty: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("critical penalty {penalty} exceeds finding weight {weight}")]
    PenaltyExceedsFindingWeight { penalty: u32, weight: u32 },
    #[error("audit weight must be non-zero")]
    ZeroAuditWeight,
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.audit_weight == 0 {
            return Err(PolicyError::ZeroAuditWeight);
        }
        if self.critical_penalty > self.finding_weight {
            return Err(PolicyError::PenaltyExceedsFindingWeight {
                penalty: self.critical_penalty,
                weight: self.finding_weight,
            });
        }
        Ok(())
    }
}

/// Inputs of the reputation function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorStats {
    pub audits_completed: u64,
    pub findings_total: u64,
    pub critical_findings: u64,
    pub verified: bool,
}

/// Compute an auditor's reputation in basis points
pub fn reputation_score(stats: &AuditorStats, policy: &ScoringPolicy) -> u32 {
    let verified_bonus = if stats.verified {
        u64::from(policy.verified_bonus)
    } else {
        0
    };

    let earned = stats
        .audits_completed
        .saturating_mul(u64::from(policy.audit_weight))
        .saturating_add(
            stats
                .findings_total
                .saturating_mul(u64::from(policy.finding_weight)),
        )
        .saturating_add(verified_bonus);

    let allowance = stats
        .audits_completed
        .saturating_mul(u64::from(policy.critical_allowance_per_audit));
    let excess_critical = stats.critical_findings.saturating_sub(allowance);
    let penalty = excess_critical.saturating_mul(u64::from(policy.critical_penalty));

    earned
        .saturating_sub(penalty)
        .min(u64::from(MAX_REPUTATION)) as u32
}

/// Aggregate security score of one contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScore {
    /// Truncated mean of contributing report scores, 0 when unaudited
    pub average: u8,
    pub audit_count: u64,
}

impl SecurityScore {
    pub fn is_audited(&self) -> bool {
        self.audit_count > 0
    }
}

/// Aggregate the report scores filed against one contract
pub fn security_score<I>(scores: I) -> SecurityScore
where
    I: IntoIterator<Item = u8>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), score| {
            (sum + u64::from(score), count + 1)
        });

    if count == 0 {
        return SecurityScore::default();
    }

    SecurityScore {
        average: (sum / count) as u8,
        audit_count: count,
    }
}
