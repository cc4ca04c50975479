//! Sync API handlers: trigger, status, and relationship statistics.

use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::ports::StoreError;
use crate::domain::{Error, ErrorCode};
use crate::domain::sync::stats::{EntityStats, SyncReport};
use crate::domain::sync::{SyncError, SyncService};

/// Body returned by a successful `POST /sync`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncTriggerResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// HTTP status code echoed in the body.
    pub code: u16,
    /// Human-readable summary.
    pub message: String,
    /// Wall-clock duration of the run in milliseconds.
    pub execution_time: u64,
    /// Per-entity counters, keyed by upstream resource type.
    pub stats: BTreeMap<String, EntityStats>,
    /// Relationship-resolution counts; omitted when the store could not be
    /// queried after the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Value>,
}

/// Error envelope shared by the 409 and 500 responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncErrorResponse {
    /// Always `"error"`.
    pub status: &'static str,
    /// HTTP status code echoed in the body.
    pub code: u16,
    /// What went wrong.
    pub message: String,
}

/// Body returned by `GET /sync/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatusResponse {
    /// Completion time of the last successful run, if any.
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether a run is currently executing.
    pub is_syncing: bool,
    /// Report of the most recently finished run.
    pub stats: Option<SyncReport>,
    /// Failure summary of the most recent run, absent after a success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Trigger a full sync run.
///
/// The request blocks until the run finishes; concurrent triggers are
/// rejected with 409 rather than queued.
#[utoipa::path(
    post,
    path = "/sync",
    tags = ["sync"],
    responses(
        (status = 200, description = "Sync completed", body = SyncTriggerResponse),
        (status = 409, description = "A sync run is already in progress", body = SyncErrorResponse),
        (status = 500, description = "The run started but could not finish", body = SyncErrorResponse)
    )
)]
#[post("/sync")]
pub async fn trigger_sync(service: web::Data<SyncService>) -> HttpResponse {
    match service.run().await {
        Ok(report) => {
            let relationships = relationship_payload(&service).await.ok();
            HttpResponse::Ok().json(SyncTriggerResponse {
                status: "ok",
                code: 200,
                message: "Sync completed".to_owned(),
                execution_time: report.duration_ms,
                stats: report.entities,
                relationships,
            })
        }
        Err(SyncError::AlreadyRunning(_)) => {
            error_response(Error::conflict("Sync already in progress"))
        }
        Err(SyncError::Aborted { reason }) => error_response(Error::internal(reason)),
    }
}

/// Render a domain error as the shared envelope, picking the HTTP status
/// from its code.
fn error_response(error: Error) -> HttpResponse {
    let status = match error.code() {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(SyncErrorResponse {
        status: "error",
        code: status.as_u16(),
        message: error.message().to_owned(),
    })
}

/// Report the last successful sync time and whether a run is executing.
#[utoipa::path(
    get,
    path = "/sync/status",
    tags = ["sync"],
    responses(
        (status = 200, description = "Current sync state", body = SyncStatusResponse)
    )
)]
#[get("/sync/status")]
pub async fn sync_status(service: web::Data<SyncService>) -> HttpResponse {
    let snapshot = service.status();
    HttpResponse::Ok().json(SyncStatusResponse {
        last_sync: snapshot.last_sync,
        is_syncing: snapshot.is_syncing,
        stats: snapshot.last_report,
        last_error: snapshot.last_failure,
    })
}

/// Report per-entity relationship resolution counts from the mirror.
#[utoipa::path(
    get,
    path = "/sync/relationship-stats",
    tags = ["sync"],
    responses(
        (status = 200, description = "Populated-versus-null counts per relationship"),
        (status = 500, description = "The mirror store could not be queried", body = SyncErrorResponse)
    )
)]
#[get("/sync/relationship-stats")]
pub async fn relationship_stats(service: web::Data<SyncService>) -> HttpResponse {
    match relationship_payload(&service).await {
        Ok(payload) => HttpResponse::Ok().json(payload),
        Err(error) => error_response(Error::internal(error.to_string())),
    }
}

/// Build the relationship-stats document: one object per resource type with
/// a `total` plus one `with_<relationship>` count per declared relationship.
async fn relationship_payload(service: &SyncService) -> Result<Value, StoreError> {
    let mut payload = serde_json::Map::new();
    for (kind, stats) in service.relationship_stats().await? {
        let mut entity = serde_json::Map::new();
        entity.insert("total".to_owned(), stats.total.into());
        for (relationship, count) in stats.populated {
            entity.insert(format!("with_{relationship}"), count.into());
        }
        payload.insert(kind.resource_type().to_owned(), Value::Object(entity));
    }
    Ok(Value::Object(payload))
}
