use std::error::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackle::{auth::token::TokenService, build_router, db, AppConfig, AppState, AuthSettings};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackle=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Trackle API server");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "Server stopped with an error");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let token_service = TokenService::new(&config.jwt_secret, config.token_ttl_hours)?;
    let auth_settings = AuthSettings {
        bcrypt_cost: config.bcrypt_cost,
        cookie_secure: config.cookie_secure,
    };

    // PostgreSQL when configured, in-memory repositories otherwise
    let app_state = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.database_max_connections).await?;
            db::run_migrations(&pool).await?;
            AppState::postgres(pool, token_service, auth_settings)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage; data is lost on exit");
            AppState::in_memory(token_service, auth_settings)
        }
    };

    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
