//! Service entry point: configuration, tracing, and the HTTP server.

use color_eyre::eyre::Result;
use ortho_config::OrthoConfig;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use opsmirror_backend::server;
use opsmirror_backend::server::config::MirrorSettings;

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }

    let settings = MirrorSettings::load()?;
    server::run(settings).await
}
