mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::store::{DocumentStore, MemoryDocumentStore};

#[tokio::main]
async fn main() {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::PortalConfig::from_env().expect("invalid configuration");
    tracing::debug!(?config, "configuration loaded");

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(database_url) => {
            let pool = db::init_pool(database_url, config.db_max_connections)
                .await
                .expect("database init failed");
            let store = services::pg_store::PgDocumentStore::new(pool);
            // Runs for the life of the process.
            let _listener = store.spawn_listener();
            tracing::info!("using postgres document store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; documents are kept in memory only");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let admin = state::RealmState::from_config(&config.admin).expect("admin auth provider");
    let student = state::RealmState::from_config(&config.student).expect("student auth provider");
    let state = state::AppState::new(store, admin, student, config.cookie_secure);
    tracing::info!(
        admin_check = config.admin.check.as_str(),
        student_check = config.student.check.as_str(),
        "realm gates configured"
    );

    let sweeper = services::session::spawn_session_sweeper(
        state.sessions.clone(),
        config.session_idle_ttl,
        config.session_sweep_interval,
    );

    let app = routes::app(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "portal listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    sweeper.abort();
    let closed = state.sessions.teardown().await;
    tracing::info!(closed, "visitor sessions torn down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
