use disk_ledger::{
    api::{self, AppState},
    config::{
        self,
        database::{create_connection, create_tables},
    },
    core::{bills::LocalBillStore, rate_limit::build_rate_limiter},
    errors::Result,
};
use dotenvy::dotenv;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the main application configuration
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!("Configuration loaded");

    // 4. Connect and ensure the schema
    let db = create_connection(
        &app_config.database_url,
        Duration::from_secs(app_config.db_timeout_secs),
    )
    .await
    .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Collaborators shared by every request
    let limiter = build_rate_limiter(&app_config.rate_limit, &db);
    let bills = Arc::new(LocalBillStore::new(app_config.bills.storage_dir.clone()));
    let bind_address = app_config.bind_address.clone();

    let state = AppState {
        db,
        config: Arc::new(app_config),
        limiter,
        bills,
    };

    // 6. Serve
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", bind_address, e))?;
    info!("Listening on {}", bind_address);
    axum::serve(
        listener,
        api::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
