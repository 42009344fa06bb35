pub mod config;
pub mod db;
pub mod error;
pub mod reconciler;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{delete, get, post},
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use config::Config;
use db::Database;
use reconciler::Reconciler;
use routes::{
    attendance_log, attendance_report, delete_face, list_faces, mark_attendance,
    register_face, set_cooldown,
};

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub reconciler: Reconciler,
}

pub fn router(state: Arc<AppState>) -> Router {
    // The browser client may be served from anywhere, so CORS stays permissive.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/register-face", post(register_face))
        .route("/registered-faces", get(list_faces))
        .route("/registered-faces/{name}", delete(delete_face))
        .route("/mark-attendance", post(mark_attendance))
        .route("/attendance-log", get(attendance_log))
        .route("/cooldown", post(set_cooldown))
        .route("/attendance-report", get(attendance_report))
        .layer(cors)
        .with_state(state)
}

pub async fn run() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("rollcall starting up...");

    let config = Config::load()?;
    let database = Database::new(config.db_path.clone())?;
    let reconciler = Reconciler::new(config.match_threshold, config.cooldown_secs);

    let address = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState {
        config,
        db: database,
        reconciler,
    });

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("listening on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("rollcall shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
