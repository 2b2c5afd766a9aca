//! Agentage authentication API server binary.
//!
//! Reads configuration from the environment (and `.env`), opens the chosen
//! store, serves the REST API, and sweeps expired state in the background
//! until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use agentage_api::AppState;
use agentage_api::config::{ApiConfig, StoreKind};
use agentage_core::db::{DEFAULT_MAX_CONNECTIONS, Database, DbError};
use agentage_core::device::DEVICE_CODE_TTL_SECS;
use agentage_core::store::memory::{MemoryDeviceCodeStore, MemoryUserStore};
use agentage_core::store::postgres::{PgDeviceCodeStore, PgUserStore};
use agentage_core::store::{DeviceCodeStore, UserStore};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_LOG_FILTER: &str = "info,agentage_api=debug,agentage_core=debug";

/// How often expired device codes, poll timestamps and OAuth states are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// CLI arguments. Each falls back to its environment variable.
#[derive(Parser, Debug)]
#[command(name = "agentage-api", version, about = "Agentage authentication API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Persistence backend: `postgres` or `memory`.
    #[arg(long, env = "STORE")]
    store: Option<StoreKind>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,
}

struct Stores {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn DeviceCodeStore>,
    db: Option<Database>,
}

async fn open_stores(config: &ApiConfig, max_connections: u32) -> Result<Stores, DbError> {
    match config.store {
        StoreKind::Postgres => {
            let db = Database::connect(&config.database_url, max_connections).await?;
            info!("running database migrations");
            db.migrate().await?;
            let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.pool().clone()));
            let codes: Arc<dyn DeviceCodeStore> =
                Arc::new(PgDeviceCodeStore::new(db.pool().clone()));
            Ok(Stores {
                users,
                codes,
                db: Some(db),
            })
        }
        StoreKind::Memory => {
            warn!("using in-memory store; all data is lost on restart");
            Ok(Stores {
                users: Arc::new(MemoryUserStore::new()),
                codes: Arc::new(MemoryDeviceCodeStore::new()),
                db: None,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(store) = args.store {
        config.store = store;
    }
    info!(?config, "starting agentage-api");

    let stores = open_stores(&config, args.max_connections).await?;
    let state = AppState::new(config, stores.users, stores.codes)?;

    let sweeps = [
        state.devices.spawn_cleanup_task(SWEEP_INTERVAL),
        state.poll_limiter.spawn_cleanup_task(
            SWEEP_INTERVAL,
            Duration::from_secs(DEVICE_CODE_TTL_SECS as u64),
        ),
        state.oauth.states().spawn_cleanup_task(SWEEP_INTERVAL),
    ];

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let app = agentage_api::router(state);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    info!(addr = %local_addr, "REST API listening");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    for sweep in sweeps {
        sweep.abort();
    }
    if let Some(db) = stores.db {
        db.close().await;
        info!("database pool closed");
    }

    result?;
    Ok(())
}
