mod app;
mod auth;
mod config;
mod db;
mod error;
mod response;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "auth_app=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Fails here, before serving, when JWT_SECRET or DATABASE_URL is missing
    let app_state = state::AppState::init().await?;
    tracing::info!(table = %app_state.config.users_table, "user directory ready");

    app::serve(app::build_app(app_state)).await
}
