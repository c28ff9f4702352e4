use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use profitpilot_api as api;
use api::{
    auth::{HandoffTokenIssuer, IdentityProvider, SupabaseIdentity},
    storage::{InMemoryStorage, ObjectStorage, StorageGateway, SupabaseStorage},
    workflow::{ExtractionWorkflow, N8nWorkflowClient},
};

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);
const STORAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_with_config(&api::db::DbConfig::from(&cfg)).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Refuses to start without a usable signing secret
    let issuer = Arc::new(
        HandoffTokenIssuer::from_config(&cfg).context("failed to create hand-off token issuer")?,
    );

    // One HTTP client per provider, built once and injected
    let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseIdentity::new(
        reqwest::Client::builder()
            .timeout(IDENTITY_TIMEOUT)
            .build()
            .context("failed to build identity client")?,
        &cfg.supabase_url,
        cfg.supabase_service_key.clone(),
    ));

    let backend: Arc<dyn ObjectStorage> = if cfg.uses_memory_storage() {
        info!("Using in-memory object storage; uploads are lost on restart");
        Arc::new(InMemoryStorage::new(cfg.storage_bucket.clone()))
    } else {
        Arc::new(SupabaseStorage::new(
            reqwest::Client::builder()
                .timeout(STORAGE_TIMEOUT)
                .build()
                .context("failed to build storage client")?,
            &cfg.supabase_url,
            cfg.storage_bucket.clone(),
            cfg.supabase_service_key.clone(),
        ))
    };
    let storage = StorageGateway::new(backend, cfg.max_upload_bytes);

    let workflow: Arc<dyn ExtractionWorkflow> = Arc::new(N8nWorkflowClient::new(
        reqwest::Client::builder()
            .build()
            .context("failed to build workflow client")?,
        cfg.n8n_webhook_url.clone(),
        cfg.extraction_timeout(),
    ));

    // Aggregate app services used by HTTP handlers
    let services =
        api::handlers::AppServices::new(db_arc.clone(), storage, issuer, workflow, &cfg);

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        services,
        identity,
    };
    let app = api::app_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("profitpilot-api listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("profitpilot-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
