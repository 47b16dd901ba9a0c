mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rookery_api::mail::{LogMailer, Mailer, SmtpMailer};
use rookery_api::{AppState, AppStateInner};
use rookery_crypto::token::TokenService;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rookery=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = rookery_db::Database::open(&config.db_path)?;
    db.insert_roles()?;

    tokio::fs::create_dir_all(&config.settings.upload_dir).await?;

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!("Sending mail through {}:{}", smtp.server, smtp.port);
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            warn!("ROOKERY_MAIL_SERVER is unset; outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(&config.secret_key),
        mailer,
        settings: config.settings.clone(),
    });

    let app = rookery_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rookery listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
