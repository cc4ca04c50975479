//! Per-run statistics reported by the sync orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Counters for one entity type within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct EntityStats {
    /// Resources received from the upstream API.
    pub fetched: u64,
    /// Rows newly inserted into the mirror.
    pub inserted: u64,
    /// Rows whose stored values actually changed.
    pub updated: u64,
    /// Rows dropped by mapping or row-level persistence failures.
    pub failed: u64,
}

impl EntityStats {
    /// Fold one batch outcome into the counters.
    pub fn absorb(&mut self, inserted: u64, updated: u64, failed: u64) {
        self.inserted += inserted;
        self.updated += updated;
        self.failed += failed;
    }

    /// Add another set of counters, e.g. rows sideloaded by a later entity
    /// type's pages.
    pub fn merge(&mut self, other: &EntityStats) {
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Full report for one sync run, keyed by upstream resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    /// When the run was admitted.
    pub started_at: DateTime<Utc>,
    /// When the run finished, successfully or not.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Counters per entity type, in resource-type order.
    pub entities: BTreeMap<String, EntityStats>,
}

impl SyncReport {
    /// Sum of failed rows across all entity types.
    pub fn total_failed(&self) -> u64 {
        self.entities.values().map(|stats| stats.failed).sum()
    }
}
