//! Per-entity counters and itemized outcomes for a run.

use super::config::MigrationConfig;
use super::outcome::{OutcomeKind, RecordOutcome};
use crate::target::TargetId;

/// Migrated/skipped/failed counts for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounters {
    pub migrated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl EntityCounters {
    /// Records attempted; always the sum of the three outcomes.
    pub fn attempted(&self) -> u64 {
        self.migrated + self.skipped + self.failed
    }

    pub fn merge(&mut self, other: &EntityCounters) {
        self.migrated += other.migrated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn bump(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Migrated => self.migrated += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }
}

/// One itemized outcome, kept for operator review.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub source_id: Option<i64>,
    pub target_id: Option<TargetId>,
    pub outcome: OutcomeKind,
    pub summary: String,
}

#[derive(Debug, Clone, Default)]
struct EntityResult {
    counters: EntityCounters,
    details: Vec<DetailRecord>,
    details_dropped: u64,
}

/// Audit output of a run.
///
/// Entities are kept in the order they first reported. Every outcome goes
/// through [`record`](Self::record), so counters always add up to the
/// number of records attempted.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    entities: Vec<(String, EntityResult)>,
    record_details: bool,
    detail_limit: usize,
}

impl Default for MigrationResult {
    fn default() -> Self {
        Self::new(false, 0)
    }
}

impl MigrationResult {
    pub fn new(record_details: bool, detail_limit: usize) -> Self {
        Self {
            entities: Vec::new(),
            record_details,
            detail_limit,
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.record_details, config.detail_limit)
    }

    fn entry(&mut self, entity: &str) -> &mut EntityResult {
        let idx = match self.entities.iter().position(|(name, _)| name == entity) {
            Some(idx) => idx,
            None => {
                self.entities
                    .push((entity.to_string(), EntityResult::default()));
                self.entities.len() - 1
            }
        };
        &mut self.entities[idx].1
    }

    fn find(&self, entity: &str) -> Option<&EntityResult> {
        self.entities
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, r)| r)
    }

    /// Make an entity appear in the summary even if it saw no records.
    pub fn touch(&mut self, entity: &str) {
        self.entry(entity);
    }

    /// Count one outcome and, when enabled, itemize it.
    pub fn record(&mut self, entity: &str, source_id: Option<i64>, outcome: &RecordOutcome) {
        let record_details = self.record_details;
        let detail_limit = self.detail_limit;
        let entry = self.entry(entity);

        entry.counters.bump(outcome.kind());
        if !record_details {
            return;
        }
        if entry.details.len() < detail_limit {
            entry.details.push(DetailRecord {
                source_id,
                target_id: outcome.target_id(),
                outcome: outcome.kind(),
                summary: outcome.summary(),
            });
        } else {
            entry.details_dropped += 1;
        }
    }

    pub fn counters(&self, entity: &str) -> EntityCounters {
        self.find(entity).map(|r| r.counters).unwrap_or_default()
    }

    pub fn details(&self, entity: &str) -> &[DetailRecord] {
        self.find(entity).map(|r| r.details.as_slice()).unwrap_or(&[])
    }

    /// Itemized records discarded because of the cap.
    pub fn details_dropped(&self, entity: &str) -> u64 {
        self.find(entity).map(|r| r.details_dropped).unwrap_or(0)
    }

    /// Entity names in reporting order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|(name, _)| name.as_str())
    }

    pub fn totals(&self) -> EntityCounters {
        let mut totals = EntityCounters::default();
        for (_, r) in &self.entities {
            totals.merge(&r.counters);
        }
        totals
    }

    pub fn has_failures(&self) -> bool {
        self.totals().failed > 0
    }

    /// Fold another result into this one (e.g. a resumed window).
    pub fn merge(&mut self, other: &MigrationResult) {
        let detail_limit = self.detail_limit;
        for (name, theirs) in &other.entities {
            let ours = self.entry(name);
            ours.counters.merge(&theirs.counters);
            ours.details_dropped += theirs.details_dropped;
            for detail in &theirs.details {
                if ours.details.len() < detail_limit {
                    ours.details.push(detail.clone());
                } else {
                    ours.details_dropped += 1;
                }
            }
        }
    }
}
