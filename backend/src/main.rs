use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router, ServiceExt,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tower::{Layer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod middleware;
mod pagination;
mod seed;
mod services;
mod validation;

#[cfg(test)]
mod tests;

/// The routed application, with trailing slashes trimmed before routing
pub type App = NormalizePath<Router>;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: config::Config,
}

#[derive(Debug, Parser)]
#[command(name = "bcms-backend", version, about = "Business continuity management API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the default organization, permissions, roles and first superuser
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Seed => {
            seed::run(&db_pool, &config.seed).await?;
            Ok(())
        }
        Command::Serve => serve(db_pool, config).await,
    }
}

async fn serve(db_pool: sqlx::PgPool, config: config::Config) -> anyhow::Result<()> {
    let server_addr = config.server_addr.clone();
    let app = build_router(Arc::new(AppState { db_pool, config }));

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Server running on {}", server_addr);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

pub fn build_router(state: Arc<AppState>) -> App {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let api = Router::new()
        .nest("/auth", auth::auth_routes())
        .nest("/organizations", handlers::organization_routes())
        .nest("/departments", handlers::department_routes())
        .nest("/users", handlers::user_routes())
        .nest("/roles", handlers::role_routes())
        .nest("/locations", handlers::location_routes())
        .nest("/applications", handlers::application_routes())
        .nest("/processes", handlers::process_routes())
        .nest("/vendors", handlers::vendor_routes())
        .nest("/bia-categories", handlers::bia_category_routes())
        .nest("/bia-parameters/impact-scales", handlers::impact_scale_routes())
        .nest("/bia-parameters/timeframes", handlers::timeframe_routes())
        .nest("/bia-impact-criteria", handlers::bia_impact_criterion_routes())
        .nest("/bia-frameworks", handlers::bia_framework_routes());

    let router = Router::new()
        .route("/", get(|| async { "BCMS API v1" }))
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(middleware::detailed_health_check))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(middleware::request_logging))
                .layer(cors),
        )
        .with_state(state);

    // Router layers run after matching, so the path is normalized outside it
    NormalizePathLayer::trim_trailing_slash().layer(router)
}
