//! Error taxonomy for sync passes
//!
//! Three severities: fatal-to-pass ([`PassError`]), fatal-to-document
//! ([`DocumentFailure`], counted in the pass report), and advisory
//! ([`Reconciliation`] divergence, logged). Nothing is retried
//! automatically; re-running the pass is the recovery mechanism.

use super::kind::EntityKind;

/// A whole entity kind's pass failed. The orchestrator logs it and moves
/// on to the next kind.
#[derive(Debug)]
pub enum PassError {
    /// Source unreachable or an extraction query failed
    Extraction {
        kind: EntityKind,
        source: anyhow::Error,
    },
    /// Index create/delete failed before any documents were written
    IndexLifecycle {
        kind: EntityKind,
        source: anyhow::Error,
    },
}

impl PassError {
    pub fn kind(&self) -> EntityKind {
        match self {
            PassError::Extraction { kind, .. } => *kind,
            PassError::IndexLifecycle { kind, .. } => *kind,
        }
    }
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassError::Extraction { kind, source } => {
                write!(f, "Extraction failed for {}: {:#}", kind, source)
            }
            PassError::IndexLifecycle { kind, source } => {
                write!(f, "Index lifecycle failed for {}: {:#}", kind, source)
            }
        }
    }
}

impl std::error::Error for PassError {}

/// One document lost during a pass (mapping, encoding, or bulk rejection)
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    /// Index key when one was derived before the failure
    pub id: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}: {}", id, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Post-pass count reconciliation outcome. Divergence is diagnostic, not
/// fatal: the pass is still reported complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Index count matches processed source rows
    Match { count: u64 },
    /// Some documents did not make it into the index
    Mismatch { indexed: u64, expected: u64 },
    /// Nothing was indexed despite rows being available
    Empty { expected: u64 },
}

impl Reconciliation {
    pub fn assess(indexed: u64, expected: u64) -> Self {
        if indexed == 0 && expected > 0 {
            Reconciliation::Empty { expected }
        } else if indexed < expected {
            Reconciliation::Mismatch { indexed, expected }
        } else {
            Reconciliation::Match { count: indexed }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Reconciliation::Match { .. })
    }
}
