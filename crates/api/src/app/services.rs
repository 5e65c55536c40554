//! Store and adapter wiring for the processor.

use std::sync::Arc;

use anyhow::Context;

use agencyhub_core::{Clock, SystemClock};
use agencyhub_infra::{
    ProcessorConfig,
    content::{ContentStore, InMemoryContentStore, PostgresContentStore},
    db,
    external::{FunctionDecryptor, WordPressClient},
    jobs::{
        HandlerRegistry, InMemoryJobStore, JobClaimer, JobExecutor, JobProcessor, JobStore,
        PostgresJobStore,
    },
};

pub struct AppServices {
    pub processor: JobProcessor,
}

/// Direct access to the in-memory stores behind an [`AppServices`], for
/// seeding in dev and tests.
#[derive(Clone)]
pub struct InMemoryStores {
    pub jobs: Arc<InMemoryJobStore>,
    pub content: Arc<InMemoryContentStore>,
}

/// Postgres stores when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_services(config: &ProcessorConfig) -> anyhow::Result<AppServices> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory stores (jobs are lost on restart)");
        let (services, _stores) = in_memory_services(config)?;
        return Ok(services);
    };

    let pool = db::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    if config.apply_schema {
        db::apply_schema(&pool)
            .await
            .context("failed to apply database schema")?;
    }

    let jobs: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(pool.clone()));
    let content: Arc<dyn ContentStore> = Arc::new(PostgresContentStore::new(pool));
    assemble(config, jobs, content, Arc::new(SystemClock))
}

pub fn in_memory_services(config: &ProcessorConfig) -> anyhow::Result<(AppServices, InMemoryStores)> {
    let stores = InMemoryStores {
        jobs: InMemoryJobStore::arc(),
        content: InMemoryContentStore::arc(),
    };
    let services = assemble(
        config,
        stores.jobs.clone(),
        stores.content.clone(),
        Arc::new(SystemClock),
    )?;
    Ok((services, stores))
}

pub fn assemble(
    config: &ProcessorConfig,
    jobs: Arc<dyn JobStore>,
    content: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AppServices> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let decryptor = Arc::new(FunctionDecryptor::new(
        http.clone(),
        config.decrypt_function_url.clone(),
        config.decrypt_service_key.clone(),
    ));
    let publisher = Arc::new(WordPressClient::new(http));

    let registry = HandlerRegistry::standard(content, decryptor.clone(), publisher, clock.clone());
    let processor = JobProcessor::new(
        JobClaimer::new(jobs.clone(), config.batch_limit),
        JobExecutor::new(registry, jobs, config.retry_policy(), clock.clone()),
        decryptor,
        clock,
    );

    Ok(AppServices { processor })
}
