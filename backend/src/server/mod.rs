//! HTTP server assembly and dependency wiring.

pub mod config;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use color_eyre::eyre::Result;
use mockable::DefaultClock;
use tracing::info;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

use crate::domain::sync::runtime::SyncRuntime;
use crate::domain::sync::SyncService;
use crate::inbound::http;
use crate::outbound::persistence::PostgresMirrorStore;
use crate::outbound::upstream::UpstreamHttpSource;
use config::MirrorSettings;

/// Wire the sync service from settings: reqwest source, PostgreSQL store,
/// system clock, and default retry runtime.
///
/// # Errors
///
/// Returns an error when a mandatory setting is missing, the HTTP client
/// cannot be built, or the database connection fails.
pub fn build_sync_service(settings: &MirrorSettings) -> Result<SyncService> {
    let source = UpstreamHttpSource::new(
        settings.upstream_base_url()?,
        settings.upstream_token()?,
        settings.request_timeout(),
    )?;
    let store = PostgresMirrorStore::connect(settings.database_url()?)?;
    let runtime = SyncRuntime::default();
    Ok(SyncService::new(
        Arc::new(source),
        Arc::new(store),
        Arc::new(DefaultClock),
        runtime.sleeper,
        runtime.jitter,
        settings.sync_config(),
    ))
}

/// Run the HTTP server until shutdown.
///
/// # Errors
///
/// Returns an error when wiring fails or the server cannot bind.
pub async fn run(settings: MirrorSettings) -> Result<()> {
    let service = web::Data::new(build_sync_service(&settings)?);
    let bind_addr = settings.bind_addr().to_owned();
    info!(bind_addr = %bind_addr, "starting sync API server");

    HttpServer::new(move || {
        let app = App::new()
            .app_data(service.clone())
            .configure(http::configure);
        #[cfg(debug_assertions)]
        let app = app.service(
            SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", crate::doc::ApiDoc::openapi()),
        );
        app
    })
    .bind(bind_addr.as_str())?
    .run()
    .await?;
    Ok(())
}
