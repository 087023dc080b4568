//! Error types for registry commands, address parsing and journal replay.

use std::fmt;

use crate::registry::types::{Address, ReportStatus};

/// A record that a command or query referred to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    Report(u64),
    Finding { report_id: u64, index: u64 },
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Report(id) => write!(f, "report {}", id),
            RecordRef::Finding { report_id, index } => {
                write!(f, "finding {} of report {}", index, report_id)
            }
        }
    }
}

/// Rejection of a registry command. Every variant leaves state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Caller lacks the role required for the target record
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        caller: Address,
        action: &'static str,
    },

    #[error("auditor {0} is not registered")]
    NotRegistered(Address),

    #[error("auditor {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("{0} not found")]
    NotFound(RecordRef),

    /// Status precondition for a lifecycle change not met
    #[error("report {report_id} cannot move from {from} to {to}")]
    InvalidTransition {
        report_id: u64,
        from: ReportStatus,
        to: ReportStatus,
    },

    #[error("security score {0} is outside 0..=100")]
    InvalidScore(u64),

    #[error("severity {0} is outside the five-level scale")]
    InvalidSeverity(u8),
}

impl RegistryError {
    /// Stable kind name, used in API error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Unauthorized { .. } => "Unauthorized",
            RegistryError::NotRegistered(_) => "NotRegistered",
            RegistryError::AlreadyRegistered(_) => "AlreadyRegistered",
            RegistryError::NotFound(_) => "NotFound",
            RegistryError::InvalidTransition { .. } => "InvalidTransition",
            RegistryError::InvalidScore(_) => "InvalidScore",
            RegistryError::InvalidSeverity(_) => "InvalidSeverity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// Failure to append or replay a journal entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("expected journal sequence {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("journal entry {sequence} does not chain onto the current head")]
    BrokenChain { sequence: u64 },

    #[error("journal entry {sequence} has a digest that does not match its contents")]
    DigestMismatch { sequence: u64 },

    #[error("journal entry {sequence} was rejected: {source}")]
    Rejected {
        sequence: u64,
        #[source]
        source: RegistryError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RegistryError::NotFound(RecordRef::Finding {
            report_id: 3,
            index: 1,
        });
        assert_eq!(err.to_string(), "finding 1 of report 3 not found");
        assert_eq!(err.kind(), "NotFound");

        let err = RegistryError::InvalidTransition {
            report_id: 0,
            from: ReportStatus::Resolved,
            to: ReportStatus::Disputed,
        };
        assert_eq!(err.to_string(), "report 0 cannot move from Resolved to Disputed");
    }
}
