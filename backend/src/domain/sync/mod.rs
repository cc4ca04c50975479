//! Sync orchestrator: walks the entity registry in dependency order and
//! mirrors each collection into the local store.
//!
//! A run fetches every page of an entity, flattens the resources against the
//! relationship-resolution context, upserts them in batches, then feeds the
//! surviving ids back into the context before moving to the next entity.
//! Self references within a type get a second pass once the whole type has
//! landed. Exactly one run may execute at a time.

pub mod fetcher;
pub mod runtime;
pub mod state;
pub mod stats;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{error, info, warn};

use self::fetcher::{PageFetcher, RetryPolicy};
use self::state::{AlreadyRunning, StatusSnapshot, SyncState};
use self::stats::{EntityStats, SyncReport};
use super::mapper::{DeferredReference, ResolutionContext, map_resource};
use super::ports::{
    BackoffJitter, EntityRelationshipStats, MirrorStore, ResourcePageSource, RetrySleeper,
    StoreError,
};
use super::registry::{EntityDescriptor, EntityKind, SYNC_ORDER};
use super::resource::ResourceObject;

pub use self::fetcher::RetryPolicy as FetchRetryPolicy;

/// Tuning knobs for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Per-page retry budget and backoff bounds.
    pub retry: RetryPolicy,
    /// Rows per upsert batch.
    pub batch_size: usize,
    /// Soft wall-clock budget for the whole run, checked between pages and
    /// entity types.
    pub run_deadline: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_size: 500,
            run_deadline: Duration::from_secs(25 * 60),
        }
    }
}

/// Errors returned by [`SyncService::run`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Another run already holds the lock.
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),
    /// The run started but could not finish; entities already processed
    /// stay persisted.
    #[error("sync run aborted: {reason}")]
    Aborted {
        /// What stopped the run.
        reason: String,
    },
}

/// Orchestrates sync runs over the source and store ports.
pub struct SyncService {
    fetcher: PageFetcher,
    store: Arc<dyn MirrorStore>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    state: Mutex<SyncState>,
}

/// Releases the `Running` phase if the run future is dropped before an
/// outcome is recorded, e.g. when the triggering request disconnects
/// mid-run. Disarmed once `complete`/`fail` take over.
struct RunGuard<'a> {
    state: &'a Mutex<SyncState>,
    armed: bool,
}

impl RunGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.fail("sync run cancelled before it could finish".to_owned(), None);
        }
    }
}

impl SyncService {
    /// Wire a service from its ports and runtime collaborators.
    pub fn new(
        source: Arc<dyn ResourcePageSource>,
        store: Arc<dyn MirrorStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn RetrySleeper>,
        jitter: Arc<dyn BackoffJitter>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher: PageFetcher::new(source, sleeper, jitter, config.retry),
            store,
            clock,
            config,
            state: Mutex::new(SyncState::new()),
        }
    }

    /// Execute one full sync run.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadyRunning`] when a run is in flight, or
    /// [`SyncError::Aborted`] when the run could not finish. An aborted run
    /// keeps everything persisted so far and leaves `last_sync` untouched.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        self.lock_state().try_begin()?;
        let mut guard = RunGuard {
            state: &self.state,
            armed: true,
        };
        let started_at = self.clock.utc();
        info!("sync run admitted");

        let mut entities = BTreeMap::new();
        let outcome = self.execute(started_at, &mut entities).await;
        let finished_at = self.clock.utc();
        let report = SyncReport {
            started_at,
            finished_at,
            duration_ms: duration_ms(started_at, finished_at),
            entities,
        };

        guard.disarm();
        match outcome {
            Ok(()) => {
                info!(
                    duration_ms = report.duration_ms,
                    failed_rows = report.total_failed(),
                    "sync run completed"
                );
                self.lock_state().complete(finished_at, report.clone());
                Ok(report)
            }
            Err(reason) => {
                error!(
                    duration_ms = report.duration_ms,
                    reason = %reason,
                    "sync run aborted"
                );
                self.lock_state().fail(reason.clone(), Some(report));
                Err(SyncError::Aborted { reason })
            }
        }
    }

    /// State view for the status endpoint.
    pub fn status(&self) -> StatusSnapshot {
        self.lock_state().snapshot()
    }

    /// Relationship-resolution counts for every entity type, in dependency
    /// order.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the mirror store.
    pub async fn relationship_stats(
        &self,
    ) -> Result<Vec<(EntityKind, EntityRelationshipStats)>, StoreError> {
        let mut collected = Vec::with_capacity(SYNC_ORDER.len());
        for kind in SYNC_ORDER {
            collected.push((kind, self.store.relationship_stats(kind).await?));
        }
        Ok(collected)
    }

    async fn execute(
        &self,
        started_at: DateTime<Utc>,
        entities: &mut BTreeMap<String, EntityStats>,
    ) -> Result<(), String> {
        let deadline = started_at
            + TimeDelta::from_std(self.config.run_deadline)
                .unwrap_or_else(|_| TimeDelta::seconds(i64::MAX / 1_000));
        let mut context = ResolutionContext::new();
        for kind in SYNC_ORDER {
            let ids = self
                .store
                .load_ids(kind)
                .await
                .map_err(|err| format!("loading existing {} ids: {err}", kind.resource_type()))?;
            context.extend(kind, ids);
        }

        for kind in SYNC_ORDER {
            let descriptor = kind.descriptor();
            if self.clock.utc() >= deadline {
                return Err(format!(
                    "run deadline reached before {}",
                    descriptor.resource_type
                ));
            }
            let collection = self
                .fetcher
                .fetch_collection(descriptor, || self.clock.utc() >= deadline)
                .await
                .map_err(|err| err.to_string())?;
            self.absorb_included(collection.included, &mut context, entities)
                .await?;
            let stats = self
                .sync_entity(descriptor, collection.data, &mut context)
                .await?;
            info!(
                resource_type = descriptor.resource_type,
                fetched = stats.fetched,
                inserted = stats.inserted,
                updated = stats.updated,
                failed = stats.failed,
                "entity synced"
            );
            entities.insert(descriptor.resource_type.to_owned(), stats);
        }
        Ok(())
    }

    /// Upsert sideloaded resources belonging to entity types that already
    /// completed this run, so pages can carry parents their own pagination
    /// missed. Sideloads for the current or later types are skipped; their
    /// own pass will fetch them.
    async fn absorb_included(
        &self,
        included: Vec<ResourceObject>,
        context: &mut ResolutionContext,
        entities: &mut BTreeMap<String, EntityStats>,
    ) -> Result<(), String> {
        let mut grouped: BTreeMap<EntityKind, Vec<ResourceObject>> = BTreeMap::new();
        for resource in included {
            let Some(kind) = EntityKind::from_resource_type(&resource.resource_type) else {
                continue;
            };
            if !entities.contains_key(kind.resource_type()) {
                continue;
            }
            grouped.entry(kind).or_default().push(resource);
        }
        for (kind, mut resources) in grouped {
            // Pages may sideload the same parent repeatedly.
            let mut seen = HashSet::new();
            resources.retain(|resource| seen.insert(resource.id));
            let descriptor = kind.descriptor();
            let stats = self.sync_entity(descriptor, resources, context).await?;
            if let Some(entry) = entities.get_mut(descriptor.resource_type) {
                entry.merge(&stats);
            }
        }
        Ok(())
    }

    /// Flatten, upsert, and backfill one fetched collection.
    async fn sync_entity(
        &self,
        descriptor: &EntityDescriptor,
        resources: Vec<ResourceObject>,
        context: &mut ResolutionContext,
    ) -> Result<EntityStats, String> {
        let mut stats = EntityStats {
            fetched: resources.len() as u64,
            ..EntityStats::default()
        };

        let mut rows = Vec::with_capacity(resources.len());
        let mut deferred: Vec<DeferredReference> = Vec::new();
        for resource in &resources {
            match map_resource(descriptor, resource, context) {
                Ok(mapped) => {
                    deferred.extend(mapped.deferred);
                    rows.push(mapped.row);
                }
                Err(failure) => {
                    stats.failed += 1;
                    warn!(
                        resource_type = descriptor.resource_type,
                        id = failure.id,
                        reason = %failure.reason,
                        "row dropped during mapping"
                    );
                }
            }
        }

        let mut succeeded: HashSet<i64> = HashSet::with_capacity(rows.len());
        for batch in rows.chunks(self.config.batch_size.max(1)) {
            let outcome = self
                .store
                .upsert(descriptor.kind, batch)
                .await
                .map_err(|err| {
                    format!("upserting {} batch: {err}", descriptor.resource_type)
                })?;
            for failure in &outcome.failed {
                warn!(
                    resource_type = descriptor.resource_type,
                    id = failure.id,
                    reason = %failure.reason,
                    "row rejected by the store"
                );
            }
            let failed_ids: HashSet<i64> =
                outcome.failed.iter().map(|failure| failure.id).collect();
            succeeded.extend(
                batch
                    .iter()
                    .map(|row| row.id)
                    .filter(|id| !failed_ids.contains(id)),
            );
            stats.absorb(
                outcome.inserted,
                outcome.updated,
                outcome.failed.len() as u64,
            );
        }
        context.extend(descriptor.kind, succeeded.iter().copied());

        self.backfill_deferred(descriptor, deferred, &succeeded, context)
            .await?;
        Ok(stats)
    }

    /// Second pass for self references: assign columns whose row landed and
    /// whose target id is now known.
    async fn backfill_deferred(
        &self,
        descriptor: &EntityDescriptor,
        deferred: Vec<DeferredReference>,
        succeeded: &HashSet<i64>,
        context: &ResolutionContext,
    ) -> Result<(), String> {
        let mut by_column: BTreeMap<&'static str, Vec<(i64, i64)>> = BTreeMap::new();
        for reference in deferred {
            if !succeeded.contains(&reference.row_id) {
                continue;
            }
            if !context.contains(descriptor.kind, reference.target_id) {
                warn!(
                    resource_type = descriptor.resource_type,
                    id = reference.row_id,
                    column = reference.column,
                    target_id = reference.target_id,
                    "self reference target never arrived; column stays null"
                );
                continue;
            }
            by_column
                .entry(reference.column)
                .or_default()
                .push((reference.row_id, reference.target_id));
        }
        for (column, assignments) in by_column {
            self.store
                .backfill_references(descriptor.kind, column, &assignments)
                .await
                .map_err(|err| {
                    format!(
                        "backfilling {}.{column}: {err}",
                        descriptor.resource_type
                    )
                })?;
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_ms(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> u64 {
    (finished_at - started_at)
        .num_milliseconds()
        .try_into()
        .unwrap_or(0)
}
