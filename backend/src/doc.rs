//! OpenAPI documentation configuration.
//!
//! Defines the [`ApiDoc`] struct generating the OpenAPI specification for
//! the sync API. Swagger UI serves the document in debug builds only.

use utoipa::OpenApi;

use crate::domain::sync::stats::{EntityStats, SyncReport};
use crate::inbound::http::sync::{SyncErrorResponse, SyncStatusResponse, SyncTriggerResponse};

/// OpenAPI document for the sync API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "opsmirror sync API",
        description = "Mirrors the upstream project-management API into a local relational store."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::sync::trigger_sync,
        crate::inbound::http::sync::sync_status,
        crate::inbound::http::sync::relationship_stats,
    ),
    components(schemas(
        SyncTriggerResponse,
        SyncErrorResponse,
        SyncStatusResponse,
        EntityStats,
        SyncReport,
    )),
    tags(
        (name = "sync", description = "Trigger and observe mirror synchronisation")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use super::ApiDoc;

    #[test]
    fn document_registers_every_sync_path() {
        let document = ApiDoc::openapi();
        let paths: Vec<&String> = document.paths.paths.keys().collect();
        assert!(paths.contains(&&"/sync".to_owned()), "paths: {paths:?}");
        assert!(paths.contains(&&"/sync/status".to_owned()), "paths: {paths:?}");
        assert!(
            paths.contains(&&"/sync/relationship-stats".to_owned()),
            "paths: {paths:?}"
        );
    }
}
