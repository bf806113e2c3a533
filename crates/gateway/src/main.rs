use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docshare_gateway::{
    accounts,
    blobs::BlobStore,
    build_router,
    config::GatewayConfig,
    notify::LogNotifier,
    store::{DataStore, MemoryStore, PgStore},
    AppState,
};
use docshare_tokens::{SigningKey, TokenService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;

    let store: Arc<dyn DataStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let store = PgStore::connect(url, config.db_max_connections).await?;
            info!("Connected to database, migrations applied.");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store. Accounts and file records are lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };

    let blobs = BlobStore::open(&config.upload_dir).await?;
    info!("Storing uploads under {}", blobs.root().display());

    if let Some(seed) = &config.operation_account {
        accounts::provision_operation_account(store.as_ref(), seed).await?;
    }

    let key = SigningKey::from_secret(config.jwt_secret.as_bytes().to_vec())?;
    let addr = config.bind_addr;

    let state = Arc::new(AppState {
        tokens: TokenService::new(key),
        store,
        blobs,
        notifier: Arc::new(LogNotifier),
        config,
    });

    let app = build_router(state);

    info!("docshare gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
