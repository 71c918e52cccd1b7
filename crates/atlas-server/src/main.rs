use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atlas_api::rate_limit::RateLimiter;
use atlas_api::roles::{RoleProvider, StaticRoleProvider};
use atlas_api::sessions::{self, SessionManager};
use atlas_api::{AppState, AppStateInner};
use atlas_db::catalog::Catalog;
use atlas_sync::coordinator::{RetryPolicy, SyncCoordinator};
use atlas_sync::reconcile::run_reconcile_loop;
use atlas_sync::{ExternalCatalog, HttpExternal, HttpSurface};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let api_key = std::env::var("ATLAS_API_KEY").unwrap_or_else(|_| "dev-key-change-me".into());
    let db_path = std::env::var("ATLAS_DB_PATH").unwrap_or_else(|_| "atlas.db".into());
    let host = std::env::var("ATLAS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ATLAS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let scanner_version =
        std::env::var("ATLAS_SCANNER_VERSION").unwrap_or_else(|_| "1.0.0".into());
    let sweep_interval: u64 = std::env::var("ATLAS_SWEEP_INTERVAL_SECS")
        .unwrap_or_else(|_| "300".into())
        .parse()?;
    let reconcile_interval: u64 = std::env::var("ATLAS_RECONCILE_INTERVAL_SECS")
        .unwrap_or_else(|_| "3600".into())
        .parse()?;

    // Init database
    let db = Arc::new(atlas_db::Database::open(&PathBuf::from(&db_path))?);
    let catalog = Catalog::new(Arc::clone(&db));

    // The external system of record is optional; without it the local
    // catalog simply is the only source of truth.
    let external: Option<Arc<dyn ExternalCatalog>> = match (
        std::env::var("ATLAS_EXTERNAL_URL"),
        std::env::var("ATLAS_EXTERNAL_KEY"),
    ) {
        (Ok(url), Ok(key)) => {
            info!("External catalog sync enabled against {}", url);
            Some(Arc::new(HttpExternal::new(url, key)))
        }
        _ => {
            info!("External catalog sync disabled");
            None
        }
    };

    let sync = SyncCoordinator::new(
        Arc::clone(&db),
        Arc::new(HttpSurface::new()),
        external,
        RetryPolicy::default(),
    );

    let roles: Arc<dyn RoleProvider> = match std::env::var("ATLAS_ROLES_PATH") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            Arc::new(StaticRoleProvider::from_json(&raw)?)
        }
        Err(_) => Arc::new(StaticRoleProvider::default()),
    };

    let session_manager = SessionManager::new(Arc::clone(&db));

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        catalog: catalog.clone(),
        sync: sync.clone(),
        sessions: session_manager.clone(),
        limiter: RateLimiter::new(),
        roles,
        api_key,
        scanner_version,
    });

    // Background loops: session expiry sweep and external reconcile.
    tokio::spawn(sessions::run_sweep_loop(session_manager, sweep_interval));
    tokio::spawn(run_reconcile_loop(catalog, sync, reconcile_interval));

    let app = atlas_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Atlas server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
