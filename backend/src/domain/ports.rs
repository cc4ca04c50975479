//! Domain ports defining the edges of the hexagon.
//!
//! Ports describe how the sync engine expects to interact with driven
//! adapters (the upstream API and the local mirror store). Each trait
//! exposes strongly typed errors so adapters map their failures into
//! predictable variants instead of returning `anyhow::Result`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

use super::registry::{EntityDescriptor, EntityKind};
use super::resource::ResourcePage;

/// 1-based page request handed to the upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub number: u32,
    /// Requested page size.
    pub size: u32,
}

/// Errors surfaced by the upstream page source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Credentials were rejected; fatal for the whole run.
    #[error("upstream authentication failed: {message}")]
    Auth {
        /// Adapter-provided detail.
        message: String,
    },
    /// Upstream throttled the request; retry after backing off.
    #[error("upstream rate limit hit: {message}")]
    RateLimited {
        /// Adapter-provided detail.
        message: String,
        /// Server-advertised wait before the next attempt, when present.
        retry_after: Option<Duration>,
    },
    /// Upstream 5xx; retryable.
    #[error("upstream server error: {message}")]
    Upstream {
        /// Adapter-provided detail.
        message: String,
    },
    /// Request or response timed out; retryable.
    #[error("upstream request timed out: {message}")]
    Timeout {
        /// Adapter-provided detail.
        message: String,
    },
    /// The endpoint or page does not exist; not retryable.
    #[error("upstream resource not found: {message}")]
    NotFound {
        /// Adapter-provided detail.
        message: String,
    },
    /// Upstream rejected the request shape; not retryable.
    #[error("upstream rejected the request: {message}")]
    Validation {
        /// Adapter-provided detail.
        message: String,
    },
    /// Payload failed to decode into JSON:API envelopes; not retryable.
    #[error("upstream payload decode failed: {message}")]
    Decode {
        /// Adapter-provided detail.
        message: String,
    },
}

impl SourceError {
    /// Helper for authentication failures.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Helper for throttling responses.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Helper for upstream 5xx responses.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Helper for timeouts.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Helper for missing endpoints or pages.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Helper for rejected requests.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Helper for payload decode failures.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether the fetch loop may retry the same page after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Upstream { .. } | Self::Timeout { .. }
        )
    }
}

/// Authenticated, paginated fetcher against the upstream JSON:API.
///
/// Stateless across calls apart from connection reuse; rate-limit
/// bookkeeping belongs to the fetch loop, not the adapter.
#[async_trait]
pub trait ResourcePageSource: Send + Sync {
    /// Fetch one page of the descriptor's resource collection.
    async fn fetch_page(
        &self,
        descriptor: &EntityDescriptor,
        page: PageRequest,
    ) -> Result<ResourcePage, SourceError>;
}

/// One flattened column value, typed by the registry's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// 64-bit integer.
    BigInt(i64),
    /// UTF-8 text.
    Text(String),
    /// Canonical numeric literal bound as text and cast to `numeric`.
    Decimal(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Calendar date.
    Date(NaiveDate),
    /// JSON document.
    Json(Value),
}

impl ColumnValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One mapped column: name plus value, in the descriptor's canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedColumn {
    /// Local column name.
    pub name: &'static str,
    /// Coerced value.
    pub value: ColumnValue,
}

/// A flat row ready for upsert; `id` is the upstream identifier and the
/// local primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    /// Upstream id, mirrored as the local primary key.
    pub id: i64,
    /// Columns in [`EntityDescriptor::columns`] order.
    pub columns: Vec<MappedColumn>,
}

impl MappedRow {
    /// Look up a column value by name.
    pub fn value_of(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.value)
    }
}

/// One row that could not be persisted or mapped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Upstream id of the offending row.
    pub id: i64,
    /// Human-readable reason recorded in stats and logs.
    pub reason: String,
}

/// Result of one batched upsert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    /// Rows newly inserted.
    pub inserted: u64,
    /// Rows whose column values actually changed.
    pub updated: u64,
    /// Rows rejected by row-level constraints.
    pub failed: Vec<RowFailure>,
}

/// Populated-versus-null foreign-key counts for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityRelationshipStats {
    /// Total mirrored rows.
    pub total: u64,
    /// Relationship name to populated-row count, in registry order.
    pub populated: Vec<(&'static str, u64)>,
}

/// Errors surfaced by the mirror store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connectivity or pool failures.
    #[error("mirror store connection failed: {message}")]
    Connection {
        /// Adapter-provided detail.
        message: String,
    },
    /// Statement execution failures not attributable to one row.
    #[error("mirror store query failed: {message}")]
    Query {
        /// Adapter-provided detail.
        message: String,
    },
}

impl StoreError {
    /// Helper for connection-level failures.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Helper for statement failures.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Idempotent persistence port over the fixed external mirror schema.
///
/// Row-level constraint violations never surface as [`StoreError`]; they are
/// recorded per row in [`UpsertOutcome::failed`] so one bad row cannot abort
/// its batch.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Ids currently present for the entity type, used to seed the
    /// relationship-resolution context.
    async fn load_ids(&self, kind: EntityKind) -> Result<Vec<i64>, StoreError>;

    /// Insert-or-update the batch inside one transaction, keyed by upstream
    /// id; unchanged rows count as neither inserted nor updated.
    async fn upsert(
        &self,
        kind: EntityKind,
        rows: &[MappedRow],
    ) -> Result<UpsertOutcome, StoreError>;

    /// Second-pass resolution of self-referential columns: set `column` to
    /// the target id for each `(row_id, target_id)` assignment.
    async fn backfill_references(
        &self,
        kind: EntityKind,
        column: &'static str,
        assignments: &[(i64, i64)],
    ) -> Result<(), StoreError>;

    /// Populated-versus-null counts per declared relationship.
    async fn relationship_stats(
        &self,
        kind: EntityKind,
    ) -> Result<EntityRelationshipStats, StoreError>;
}

/// Async clock-independent sleeping abstraction for retries.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    fn jittered_delay(&self, base: Duration, attempt: u32) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_error_taxonomy() {
        assert!(SourceError::rate_limited("slow down", None).is_retryable());
        assert!(SourceError::upstream("boom").is_retryable());
        assert!(SourceError::timeout("slow").is_retryable());
        assert!(!SourceError::auth("bad token").is_retryable());
        assert!(!SourceError::not_found("gone").is_retryable());
        assert!(!SourceError::validation("bad page").is_retryable());
        assert!(!SourceError::decode("not json").is_retryable());
    }

    #[test]
    fn mapped_row_lookup_finds_columns_by_name() {
        let row = MappedRow {
            id: 9,
            columns: vec![MappedColumn {
                name: "company_id",
                value: ColumnValue::BigInt(3),
            }],
        };
        assert_eq!(row.value_of("company_id"), Some(&ColumnValue::BigInt(3)));
        assert_eq!(row.value_of("missing"), None);
    }
}
