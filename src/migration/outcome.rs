//! Per-record outcomes.

use std::fmt;

use crate::target::TargetId;

/// Why a record was not migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The idempotency key matched an existing target entity.
    AlreadyExists,
    /// A required foreign reference has no mapping.
    UnresolvedReference {
        entity: &'static str,
        source_id: Option<i64>,
    },
    /// The row cannot produce a valid entity (missing email, empty body...).
    Invalid(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
            SkipReason::UnresolvedReference {
                entity,
                source_id: Some(id),
            } => write!(f, "unresolved {} reference {}", entity, id),
            SkipReason::UnresolvedReference {
                entity,
                source_id: None,
            } => write!(f, "missing {} reference", entity),
            SkipReason::Invalid(why) => write!(f, "invalid: {}", why),
        }
    }
}

/// Result of processing one source row.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Migrated {
        target_id: TargetId,
        summary: String,
    },
    Skipped {
        /// Set when the record matched an existing entity.
        target_id: Option<TargetId>,
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

impl RecordOutcome {
    pub fn migrated(target_id: TargetId, summary: impl Into<String>) -> Self {
        RecordOutcome::Migrated {
            target_id,
            summary: summary.into(),
        }
    }

    pub fn already_exists(target_id: TargetId) -> Self {
        RecordOutcome::Skipped {
            target_id: Some(target_id),
            reason: SkipReason::AlreadyExists,
        }
    }

    pub fn unresolved(entity: &'static str, source_id: Option<i64>) -> Self {
        RecordOutcome::Skipped {
            target_id: None,
            reason: SkipReason::UnresolvedReference { entity, source_id },
        }
    }

    pub fn invalid(why: impl Into<String>) -> Self {
        RecordOutcome::Skipped {
            target_id: None,
            reason: SkipReason::Invalid(why.into()),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        RecordOutcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            RecordOutcome::Migrated { .. } => OutcomeKind::Migrated,
            RecordOutcome::Skipped { .. } => OutcomeKind::Skipped,
            RecordOutcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            RecordOutcome::Migrated { target_id, .. } => Some(*target_id),
            RecordOutcome::Skipped { target_id, .. } => *target_id,
            RecordOutcome::Failed { .. } => None,
        }
    }

    /// Human-readable description for detail records and logs.
    pub fn summary(&self) -> String {
        match self {
            RecordOutcome::Migrated { summary, .. } => summary.clone(),
            RecordOutcome::Skipped { reason, .. } => reason.to_string(),
            RecordOutcome::Failed { error } => error.clone(),
        }
    }
}

/// Coarse outcome category, the unit the counters are kept in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Migrated,
    Skipped,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Migrated => "migrated",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_text() {
        assert_eq!(SkipReason::AlreadyExists.to_string(), "already exists");
        assert_eq!(
            RecordOutcome::unresolved("users", Some(4)).summary(),
            "unresolved users reference 4"
        );
        assert_eq!(
            RecordOutcome::unresolved("forums", None).summary(),
            "missing forums reference"
        );
    }

    #[test]
    fn test_target_id_by_kind() {
        assert_eq!(RecordOutcome::migrated(0, "x").target_id(), Some(0));
        assert_eq!(RecordOutcome::already_exists(5).target_id(), Some(5));
        assert_eq!(RecordOutcome::failed("boom").target_id(), None);
        assert_eq!(RecordOutcome::failed("boom").kind(), OutcomeKind::Failed);
    }
}
