use std::sync::Arc;

use anyhow::Context;

use agencyhub_infra::ProcessorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agencyhub_observability::init();

    let config = ProcessorConfig::from_env().context("invalid configuration")?;
    tracing::info!(config = ?config, "starting scheduled job processor");

    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set; /process-scheduled-jobs accepts unauthenticated requests");
    }

    let services = agencyhub_api::app::services::build_services(&config).await?;
    let app = agencyhub_api::app::build_app(Arc::new(services), config.cron_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
