//! Operation Journal
//!
//! The registry's single global operation sequence. Each committed command is
//! recorded with a dense sequence number and a SHA-256 digest chained onto the
//! previous entry, so a persisted journal can be replayed and checked for
//! gaps or tampering. Rejected commands never reach the journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::registry::command::RegistryCommand;
use crate::registry::error::JournalError;
use crate::registry::types::Address;

/// Digest preceding the first entry
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub caller: Address,
    pub command: RegistryCommand,
    pub committed_at: DateTime<Utc>,
    pub previous_digest: String,
    pub digest: String,
}

impl JournalEntry {
    pub fn compute_digest(
        previous_digest: &str,
        sequence: u64,
        caller: &Address,
        command: &RegistryCommand,
        committed_at: &DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(previous_digest.as_bytes());
        hasher.update(sequence.to_le_bytes());
        hasher.update(caller.as_str().as_bytes());
        hasher.update(serde_json::to_vec(command).unwrap_or_default());
        hasher.update(committed_at.timestamp_micros().to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_digest(&self) -> bool {
        self.digest
            == Self::compute_digest(
                &self.previous_digest,
                self.sequence,
                &self.caller,
                &self.command,
                &self.committed_at,
            )
    }
}

/// Truncate to the microsecond precision that storage preserves
pub fn journal_timestamp(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

#[derive(Debug, Clone, Default)]
pub struct OperationJournal {
    entries: Vec<JournalEntry>,
}

impl OperationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn head_digest(&self) -> &str {
        self.entries
            .last()
            .map(|entry| entry.digest.as_str())
            .unwrap_or(GENESIS_DIGEST)
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<JournalEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Build the entry that would be appended next
    pub fn draft(
        &self,
        caller: &Address,
        command: RegistryCommand,
        committed_at: DateTime<Utc>,
    ) -> JournalEntry {
        let sequence = self.next_sequence();
        let previous_digest = self.head_digest().to_string();
        let committed_at = journal_timestamp(committed_at);
        let digest =
            JournalEntry::compute_digest(&previous_digest, sequence, caller, &command, &committed_at);

        JournalEntry {
            sequence,
            caller: caller.clone(),
            command,
            committed_at,
            previous_digest,
            digest,
        }
    }

    /// Check that `entry` extends the journal exactly at its head
    pub fn check_continuity(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let expected = self.next_sequence();
        if entry.sequence != expected {
            return Err(JournalError::SequenceGap {
                expected,
                found: entry.sequence,
            });
        }
        if entry.previous_digest != self.head_digest() {
            return Err(JournalError::BrokenChain {
                sequence: entry.sequence,
            });
        }
        if !entry.verify_digest() {
            return Err(JournalError::DigestMismatch {
                sequence: entry.sequence,
            });
        }
        Ok(())
    }

    pub(crate) fn append(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }
}
