//! HTTP adapter exposing the sync API.

pub mod sync;

use actix_web::web;

/// Register every sync route on the application.
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(sync::trigger_sync)
        .service(sync::sync_status)
        .service(sync::relationship_stats);
}
