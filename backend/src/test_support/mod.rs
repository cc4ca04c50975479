//! Shared test doubles for the sync engine.
//!
//! Compiled only with the `test-support` feature, which the crate's own
//! dev-dependency on itself enables. Everything here is deterministic and
//! in-memory so orchestrator and handler tests never touch a network or a
//! database.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::domain::ports::{
    BackoffJitter, ColumnValue, EntityRelationshipStats, MappedRow, MirrorStore, PageRequest,
    ResourcePageSource, RetrySleeper, RowFailure, SourceError, StoreError, UpsertOutcome,
};
use crate::domain::registry::{EntityDescriptor, EntityKind};
use crate::domain::resource::{PageMeta, Reference, ResourceIdentifier, ResourceObject, ResourcePage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`MirrorStore`] with change detection and scripted row
/// rejections.
#[derive(Default)]
pub struct InMemoryMirrorStore {
    tables: Mutex<HashMap<EntityKind, BTreeMap<i64, BTreeMap<&'static str, ColumnValue>>>>,
    reject_ids: Mutex<HashMap<EntityKind, HashSet<i64>>>,
    fail_upserts_for: Mutex<HashSet<EntityKind>>,
}

impl InMemoryMirrorStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the given upstream id with a row-level failure, imitating a
    /// per-row constraint violation.
    pub fn reject_row(&self, kind: EntityKind, id: i64) {
        lock(&self.reject_ids).entry(kind).or_default().insert(id);
    }

    /// Fail every upsert batch for the entity type with a [`StoreError`].
    pub fn fail_upserts(&self, kind: EntityKind) {
        lock(&self.fail_upserts_for).insert(kind);
    }

    /// Number of stored rows for the entity type.
    pub fn row_count(&self, kind: EntityKind) -> usize {
        lock(&self.tables)
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }

    /// Stored value of one column, or `None` when the row is absent.
    pub fn column(&self, kind: EntityKind, id: i64, name: &str) -> Option<ColumnValue> {
        lock(&self.tables)
            .get(&kind)
            .and_then(|rows| rows.get(&id))
            .and_then(|row| row.get(name).cloned())
    }

    /// Seed a row directly, bypassing upsert bookkeeping.
    pub fn seed_row(&self, kind: EntityKind, row: &MappedRow) {
        lock(&self.tables)
            .entry(kind)
            .or_default()
            .insert(row.id, columns_of(row));
    }

    /// Row currently holding the descriptor's pair-uniqueness key, if a
    /// different row owns it. Such a collision arbitrates the upsert, like
    /// `ON CONFLICT` over the pair index.
    fn unique_by_match(
        descriptor: &EntityDescriptor,
        rows: &BTreeMap<i64, BTreeMap<&'static str, ColumnValue>>,
        id: i64,
        columns: &BTreeMap<&'static str, ColumnValue>,
    ) -> Option<i64> {
        let (first, second) = descriptor.unique_by?;
        let key = (columns.get(first), columns.get(second));
        if key.0.is_none_or(ColumnValue::is_null) || key.1.is_none_or(ColumnValue::is_null) {
            return None;
        }
        rows.iter()
            .find(|(other_id, other)| {
                **other_id != id && (other.get(first), other.get(second)) == key
            })
            .map(|(other_id, _)| *other_id)
    }
}

fn columns_of(row: &MappedRow) -> BTreeMap<&'static str, ColumnValue> {
    row.columns
        .iter()
        .map(|column| (column.name, column.value.clone()))
        .collect()
}

#[async_trait]
impl MirrorStore for InMemoryMirrorStore {
    async fn load_ids(&self, kind: EntityKind) -> Result<Vec<i64>, StoreError> {
        Ok(lock(&self.tables)
            .get(&kind)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        kind: EntityKind,
        rows: &[MappedRow],
    ) -> Result<UpsertOutcome, StoreError> {
        if lock(&self.fail_upserts_for).contains(&kind) {
            return Err(StoreError::query("scripted batch failure"));
        }
        let descriptor = kind.descriptor();
        let rejected = lock(&self.reject_ids).get(&kind).cloned().unwrap_or_default();
        let mut tables = lock(&self.tables);
        let table = tables.entry(kind).or_default();
        let mut outcome = UpsertOutcome::default();
        for row in rows {
            if rejected.contains(&row.id) {
                outcome.failed.push(RowFailure {
                    id: row.id,
                    reason: "constraint violation".to_owned(),
                });
                continue;
            }
            let columns = columns_of(row);
            if let Some(existing_id) = Self::unique_by_match(descriptor, table, row.id, &columns) {
                let existing = table.entry(existing_id).or_default();
                if *existing != columns {
                    *existing = columns;
                    outcome.updated += 1;
                }
                continue;
            }
            match table.get(&row.id) {
                None => {
                    table.insert(row.id, columns);
                    outcome.inserted += 1;
                }
                Some(existing) if *existing != columns => {
                    table.insert(row.id, columns);
                    outcome.updated += 1;
                }
                Some(_) => {}
            }
        }
        Ok(outcome)
    }

    async fn backfill_references(
        &self,
        kind: EntityKind,
        column: &'static str,
        assignments: &[(i64, i64)],
    ) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        let table = tables.entry(kind).or_default();
        for (row_id, target_id) in assignments {
            if let Some(row) = table.get_mut(row_id) {
                row.insert(column, ColumnValue::BigInt(*target_id));
            }
        }
        Ok(())
    }

    async fn relationship_stats(
        &self,
        kind: EntityKind,
    ) -> Result<EntityRelationshipStats, StoreError> {
        let descriptor = kind.descriptor();
        let tables = lock(&self.tables);
        let empty = BTreeMap::new();
        let rows = tables.get(&kind).unwrap_or(&empty);
        let populated = descriptor
            .relation_columns()
            .into_iter()
            .map(|(relationship, column)| {
                let count = rows
                    .values()
                    .filter(|row| row.get(column).is_some_and(|value| !value.is_null()))
                    .count() as u64;
                (relationship, count)
            })
            .collect();
        Ok(EntityRelationshipStats {
            total: rows.len() as u64,
            populated,
        })
    }
}

/// Scripted [`ResourcePageSource`] keyed by resource type.
///
/// Unscripted requests return an empty single-page collection so tests only
/// script the entity types they care about.
#[derive(Default)]
pub struct ScriptedPageSource {
    scripts: Mutex<HashMap<&'static str, VecDeque<Result<ResourcePage, SourceError>>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedPageSource {
    /// Empty source; every fetch yields an empty page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for the resource type.
    pub fn script(
        &self,
        resource_type: &'static str,
        response: Result<ResourcePage, SourceError>,
    ) {
        lock(&self.scripts)
            .entry(resource_type)
            .or_default()
            .push_back(response);
    }

    /// `(resource_type, page_number)` pairs in request order.
    pub fn calls(&self) -> Vec<(String, u32)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ResourcePageSource for ScriptedPageSource {
    async fn fetch_page(
        &self,
        descriptor: &EntityDescriptor,
        page: PageRequest,
    ) -> Result<ResourcePage, SourceError> {
        lock(&self.calls).push((descriptor.resource_type.to_owned(), page.number));
        lock(&self.scripts)
            .get_mut(descriptor.resource_type)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(page_of(Vec::new(), page.number, page.number)))
    }
}

/// Manually advanced [`Clock`] for deadline tests.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    /// Clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = TimeDelta::from_std(delta).unwrap_or_else(|error| {
            panic!("duration does not fit a TimeDelta: {error}; delta={delta:?}")
        });
        *lock(&self.0) += delta;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    /// Fresh sleeper with no recorded delays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far.
    pub fn slept(&self) -> Vec<Duration> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0).push(duration);
    }
}

/// Jitter that returns the base delay unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        base
    }
}

/// Resource-object builder for tests.
pub fn resource(id: i64, resource_type: &str) -> ResourceObject {
    ResourceObject::new(id, resource_type)
}

/// Add an attribute to a resource.
pub fn with_attr(mut resource: ResourceObject, field: &str, value: Value) -> ResourceObject {
    resource.attributes.insert(field.to_owned(), value);
    resource
}

/// Add a single-valued relationship to a resource.
pub fn with_ref(
    mut resource: ResourceObject,
    relationship: &str,
    target_type: &str,
    id: i64,
) -> ResourceObject {
    resource.relationships.insert(
        relationship.to_owned(),
        Reference::One(ResourceIdentifier::new(target_type, id)),
    );
    resource
}

/// Wrap resources into one page with the given pagination meta.
pub fn page_of(data: Vec<ResourceObject>, current_page: u32, total_pages: u32) -> ResourcePage {
    ResourcePage {
        data,
        included: Vec::new(),
        meta: PageMeta {
            current_page,
            total_pages,
        },
    }
}

/// Like [`page_of`], with sideloaded resources attached.
pub fn page_with_included(
    data: Vec<ResourceObject>,
    included: Vec<ResourceObject>,
    current_page: u32,
    total_pages: u32,
) -> ResourcePage {
    ResourcePage {
        data,
        included,
        meta: PageMeta {
            current_page,
            total_pages,
        },
    }
}
