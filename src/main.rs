use std::sync::Arc;

use campus_api::audit::TracingAudit;
use campus_api::config::AppConfig;
use campus_api::tenant::PgTenantDirectory;
use campus_api::{database, router, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_api=debug,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting Campus API in {:?} mode", config.environment);

    let pool = database::connect(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to connect database: {}", e));

    let state = AppState::new(
        pool.clone(),
        Arc::new(PgTenantDirectory::new(pool)),
        Arc::new(TracingAudit),
        config,
    );

    let app = router(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("CAMPUS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Campus API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}
