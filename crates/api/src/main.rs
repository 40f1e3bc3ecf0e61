use std::sync::Arc;

use anyhow::Context;

use deskhive_auth::{BcryptHasher, Hs256SessionCodec};
use deskhive_infra::{AccessEngine, AppConfig, DirectoryStore, InMemoryDirectoryStore, PostgresDirectoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    deskhive_observability::init(config.log_format);

    if config.jwt_secret == deskhive_infra::config::DEV_JWT_SECRET {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let postgres = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresDirectoryStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            tracing::info!("using Postgres directory store");
            Some(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory directory store");
            None
        }
    };

    let store: Arc<dyn DirectoryStore> = match &postgres {
        Some(store) => store.clone(),
        None => Arc::new(InMemoryDirectoryStore::new()),
    };

    let engine = AccessEngine::new(
        store,
        Arc::new(Hs256SessionCodec::new(config.jwt_secret.as_bytes())),
        Arc::new(BcryptHasher::new(config.bcrypt_cost)),
    )
    .with_token_ttl(config.token_ttl);

    let app = deskhive_api::app::build_app(engine);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(store) = postgres {
        store.pool().close().await;
        tracing::info!("database pool closed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
