mod campus;
mod error;
mod routes;
mod storage;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post, put},
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use campuswatch_api::oauth;

use campus::CampusClient;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub campus: CampusClient,
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub session_secret: String,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for CampusClient {
    fn from_ref(state: &AppState) -> Self {
        state.campus.clone()
    }
}

fn env_or_warn(name: &str) -> String {
    match std::env::var(name).ok().filter(|s| !s.is_empty()) {
        Some(value) => value,
        None => {
            tracing::warn!("{name} environment variable not set");
            String::new()
        }
    }
}

/// Load the identity-provider configuration. Missing credentials warn but do
/// not abort startup — the server still serves pages and local data.
fn load_provider_config() -> oauth::ProviderConfig {
    let client_id = env_or_warn("CAMPUS_CLIENT_ID");
    let client_secret = env_or_warn("CAMPUS_CLIENT_SECRET");
    let redirect_url = env_or_warn("CAMPUS_REDIRECT_URL");
    let base_url = std::env::var("CAMPUS_API_URL").ok().filter(|s| !s.is_empty());

    oauth::campus_preset(base_url, client_id, client_secret, redirect_url)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campuswatch_server=info,tower_http=info".into()),
        )
        .init();

    let db_path = std::env::var("DB_PATH")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("campuswatch.db"));
    tracing::info!("database file: {}", db_path.display());

    let db = storage::init_db(&db_path)?;
    tracing::info!("database initialized");

    let session_secret = std::env::var("SESSION_SECRET").unwrap_or_default();
    if session_secret.is_empty() {
        tracing::warn!("SESSION_SECRET not set — login will be disabled");
    }

    let campus = CampusClient::new(load_provider_config());
    let config = AppConfig { session_secret };
    let state = AppState { db, config, campus };

    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/students/search", get(routes::students::search))
        .route("/students/{login}/projects", get(routes::students::projects))
        .route("/reports", post(routes::reports::create_report))
        .route("/report-reasons", get(routes::reports::report_reasons))
        .route("/stats", get(routes::stats::user_count))
        .route("/me", get(routes::auth::me))
        .route("/sync-users", post(routes::sync::sync_users))
        .route("/staff/reports", get(routes::staff::pending_reports))
        .route("/staff/reports/{id}", put(routes::staff::review_report))
        .route("/staff/project-stats", get(routes::staff::project_stats));

    let app = Router::new()
        .route("/", get(routes::pages::index))
        .route("/login", get(routes::auth::login))
        .route("/callback", get(routes::auth::callback))
        .route("/dashboard", get(routes::pages::dashboard))
        .route("/admin", get(routes::pages::admin))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    tracing::info!("starting server on port {port}");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
